//! Arena allocator for tensor storage.
//!
//! The allocator hands out byte offsets into one virtual arena. It runs in two
//! phases:
//!
//! 1. **Planning** - `alloc`/`free` move offsets around a free-block map. No
//!    physical memory exists yet; the allocator only tracks `used` and its
//!    high-water mark `peak`.
//! 2. **Materialized** - the first [`Allocator::get_ptr`] asks the runtime for
//!    exactly `peak` bytes. From then on offsets are frozen and `alloc`/`free`
//!    are rejected.
//!
//! Placement is first-fit in address order. Released ranges are merged with
//! adjacent free neighbours so the map never holds two touching free blocks.

use std::collections::BTreeMap;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use tensorplan_runtime::{BufferHandle, Runtime};

use crate::config::{AllocatorConfig, ConfigError};
use crate::error::AllocError;

/// Lifecycle stage of an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorPhase {
    Planning,
    Materialized(BufferHandle),
}

/// Snapshot of allocator accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    pub used: usize,
    pub peak: usize,
    pub free_blocks: usize,
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Used memory: {}, peak memory: {}, free blocks: {}",
            self.used, self.peak, self.free_blocks
        )
    }
}

pub struct Allocator {
    runtime: Rc<dyn Runtime>,

    /// Free block start -> length, ordered by address
    free_blocks: BTreeMap<usize, usize>,

    used: usize,
    peak: usize,
    alignment: usize,
    capacity: usize,
    phase: AllocatorPhase,
}

impl Allocator {
    pub fn new(runtime: Rc<dyn Runtime>) -> Self {
        Self::from_valid_config(runtime, &AllocatorConfig::default())
    }

    /// Build an allocator from `config`, rejecting a non-power-of-two
    /// alignment or an oversized capacity.
    pub fn with_config(runtime: Rc<dyn Runtime>, config: &AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(runtime, config))
    }

    pub(crate) fn from_valid_config(runtime: Rc<dyn Runtime>, config: &AllocatorConfig) -> Self {
        let mut free_blocks = BTreeMap::new();
        if config.capacity > 0 {
            free_blocks.insert(0, config.capacity);
        }

        Self {
            runtime,
            free_blocks,
            used: 0,
            peak: 0,
            alignment: config.alignment,
            capacity: config.capacity,
            phase: AllocatorPhase::Planning,
        }
    }

    /// Reserve `size` bytes and return the start offset.
    ///
    /// Zero-byte requests still take one alignment unit.
    pub fn alloc(&mut self, size: usize) -> Result<usize, AllocError> {
        self.ensure_planning("alloc")?;

        let Some(size) = self.aligned_size(size) else {
            return Err(AllocError::OutOfMemory {
                requested: size,
                largest_free: self.largest_free_block(),
            });
        };

        let candidate = self
            .free_blocks
            .iter()
            .find(|(_, &len)| len >= size)
            .map(|(&addr, &len)| (addr, len));

        let Some((addr, len)) = candidate else {
            return Err(AllocError::OutOfMemory {
                requested: size,
                largest_free: self.largest_free_block(),
            });
        };

        self.free_blocks.remove(&addr);
        if len > size {
            self.free_blocks.insert(addr + size, len - size);
        }

        self.used += size;
        self.peak = self.peak.max(self.used);

        log::debug!("alloc {} bytes at {} (used {}, peak {})", size, addr, self.used, self.peak);
        log::trace!("free blocks: {:?}", self.free_blocks);
        Ok(addr)
    }

    /// Return `[addr, addr + size)` to the arena.
    ///
    /// `addr` and `size` must describe a live allocation handed out by
    /// [`Allocator::alloc`]. Ranges that reach past the arena are rejected
    /// with [`AllocError::InvalidFree`]; other mismatches are a caller bug.
    pub fn free(&mut self, addr: usize, size: usize) -> Result<(), AllocError> {
        self.ensure_planning("free")?;

        let invalid = AllocError::InvalidFree { addr, size };
        let Some(size) = self.aligned_size(size) else {
            return Err(invalid);
        };
        let end = match addr.checked_add(size) {
            Some(end) if end <= self.capacity => end,
            _ => return Err(invalid),
        };

        let mut start = addr;
        let mut len = size;

        if let Some((&prev_addr, &prev_len)) = self.free_blocks.range(..addr).next_back() {
            debug_assert!(prev_addr + prev_len <= addr, "free overlaps free block at {}", prev_addr);
            if prev_addr + prev_len == addr {
                self.free_blocks.remove(&prev_addr);
                start = prev_addr;
                len += prev_len;
            }
        }

        debug_assert!(
            self.free_blocks.range(addr..end).next().is_none(),
            "free overlaps an already free range"
        );
        if let Some(next_len) = self.free_blocks.remove(&end) {
            len += next_len;
        }

        self.free_blocks.insert(start, len);

        debug_assert!(self.used >= size, "released more than was allocated");
        self.used = self.used.saturating_sub(size);

        log::debug!("free {} bytes at {} (used {})", size, addr, self.used);
        log::trace!("free blocks: {:?}", self.free_blocks);
        Ok(())
    }

    /// Base of the physical buffer, obtaining it on first call.
    ///
    /// The buffer is exactly `peak` bytes. This switches the allocator into the
    /// materialized phase for good.
    pub fn get_ptr(&mut self) -> Result<NonNull<u8>, AllocError> {
        self.materialize().map(|handle| handle.as_non_null())
    }

    /// Like [`Allocator::get_ptr`], returning the whole buffer handle.
    pub fn materialize(&mut self) -> Result<BufferHandle, AllocError> {
        if let AllocatorPhase::Materialized(handle) = self.phase {
            return Ok(handle);
        }

        let handle = self.runtime.alloc(self.peak)?;
        log::info!(
            "allocator materialized {} bytes at {:p} via {} runtime",
            self.peak,
            handle.as_ptr(),
            self.runtime.name()
        );
        self.phase = AllocatorPhase::Materialized(handle);
        Ok(handle)
    }

    /// Log and return the current accounting.
    pub fn info(&self) -> AllocatorStats {
        let stats = self.stats();
        log::info!("{}", stats);
        stats
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used: self.used,
            peak: self.peak,
            free_blocks: self.free_blocks.len(),
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn phase(&self) -> AllocatorPhase {
        self.phase
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.phase, AllocatorPhase::Materialized(_))
    }

    /// The physical buffer, if materialized.
    pub fn buffer(&self) -> Option<BufferHandle> {
        match self.phase {
            AllocatorPhase::Planning => None,
            AllocatorPhase::Materialized(handle) => Some(handle),
        }
    }

    /// Free blocks as `(start, len)` in address order.
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_blocks.iter().map(|(&addr, &len)| (addr, len))
    }

    pub fn largest_free_block(&self) -> usize {
        self.free_blocks.values().copied().max().unwrap_or(0)
    }

    /// Round `size` up to the alignment. `None` on overflow.
    pub fn aligned_size(&self, size: usize) -> Option<usize> {
        let size = size.max(1);
        let units = size.checked_add(self.alignment - 1)? / self.alignment;
        units.checked_mul(self.alignment)
    }

    fn ensure_planning(&self, operation: &'static str) -> Result<(), AllocError> {
        match self.phase {
            AllocatorPhase::Planning => Ok(()),
            AllocatorPhase::Materialized(_) => Err(AllocError::Materialized { operation }),
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("runtime", &self.runtime.name())
            .field("used", &self.used)
            .field("peak", &self.peak)
            .field("alignment", &self.alignment)
            .field("free_blocks", &self.free_blocks)
            .field("phase", &self.phase)
            .finish()
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        if let AllocatorPhase::Materialized(handle) = self.phase {
            self.runtime.dealloc(handle);
        }
    }
}
