//! Host-memory backing store.
//!
//! Wraps Rust's global allocator and hands out typed [`BufferHandle`]s instead
//! of raw pointers.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::{BufferHandle, Runtime, RuntimeError};

/// Alignment of every host buffer. Matches the widest scalar the engine stores.
pub const HOST_ALIGNMENT: usize = 8;

/// Backing store that serves buffers from the process heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuRuntime;

impl CpuRuntime {
    pub fn new() -> Self {
        Self
    }

    // Zero-sized layouts are not allowed by the global allocator, so an empty
    // request still reserves one aligned unit.
    fn layout_for(size: usize) -> Result<Layout, RuntimeError> {
        Layout::from_size_align(size.max(1), HOST_ALIGNMENT)
            .map_err(|_| RuntimeError::InvalidLayout { size })
    }
}

impl Runtime for CpuRuntime {
    fn name(&self) -> &str {
        "cpu"
    }

    fn alloc(&self, size: usize) -> Result<BufferHandle, RuntimeError> {
        let layout = Self::layout_for(size)?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RuntimeError::OutOfHostMemory { size })?;

        log::debug!("cpu runtime: allocated {} bytes at {:p}", size, ptr);
        Ok(BufferHandle::new(ptr, size))
    }

    fn dealloc(&self, handle: BufferHandle) {
        let Ok(layout) = Self::layout_for(handle.size()) else {
            log::error!("cpu runtime: refusing to free buffer with invalid size {}", handle.size());
            return;
        };

        log::debug!("cpu runtime: released {} bytes at {:p}", handle.size(), handle.as_ptr());
        // SAFETY: the handle was produced by `alloc` above with the same layout.
        unsafe { dealloc(handle.as_ptr(), layout) };
    }
}
