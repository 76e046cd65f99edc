//! Tensorplan Runtime Library
//!
//! Backing-store providers for the planning engine. The engine never touches
//! device or host memory directly: once memory planning has settled on a peak
//! size it asks a [`Runtime`] for exactly one buffer of that size and releases
//! it again at teardown.
//!
//! # Providers
//!
//! - [`CpuRuntime`]: host heap through Rust's global allocator
//!
//! Device backends implement the same trait out of tree.

use std::fmt;
use std::ptr::NonNull;

pub mod cpu;

pub use cpu::CpuRuntime;

/// A physical buffer obtained from a [`Runtime`].
///
/// The handle is a plain pointer + length pair. It does not own the memory;
/// whoever called [`Runtime::alloc`] is responsible for handing it back to
/// [`Runtime::dealloc`] exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    ptr: NonNull<u8>,
    size: usize,
}

impl BufferHandle {
    pub fn new(ptr: NonNull<u8>, size: usize) -> Self {
        Self { ptr, size }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Backing-store provider contract.
pub trait Runtime: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Acquire `size` bytes.
    fn alloc(&self, size: usize) -> Result<BufferHandle, RuntimeError>;

    /// Release a buffer previously returned by [`Runtime::alloc`].
    fn dealloc(&self, handle: BufferHandle);
}

/// Errors raised by a backing-store provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The request cannot be described as a valid allocation layout
    InvalidLayout { size: usize },

    /// The provider ran out of memory
    OutOfHostMemory { size: usize },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidLayout { size } => {
                write!(f, "Invalid allocation layout for {} bytes", size)
            }
            RuntimeError::OutOfHostMemory { size } => {
                write!(f, "Host allocation of {} bytes failed", size)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::OutOfHostMemory { size: 128 };
        assert_eq!(err.to_string(), "Host allocation of 128 bytes failed");
    }

    #[test]
    fn test_runtime_is_object_safe() {
        let rt: Box<dyn Runtime> = Box::new(CpuRuntime::new());
        assert_eq!(rt.name(), "cpu");
        let handle = rt.alloc(8).unwrap();
        rt.dealloc(handle);
    }
}
