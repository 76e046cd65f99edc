//! Memory planning: one reservation for every tensor, then bind.

use super::Graph;
use crate::allocator::AllocatorStats;
use crate::error::{AllocError, GraphError};
use crate::tensor::{DataBlob, Tensor};

impl Graph {
    /// Reserve storage for every tensor and bind each one to its byte range.
    ///
    /// All tensors share a single contiguous reservation, laid out back to
    /// back in tensor-table order. The allocator then materializes its buffer
    /// (sized to its peak) and each tensor gets a [`DataBlob`] into it.
    ///
    /// The allocator cannot plan again once materialized, so a second call
    /// fails with [`AllocError::Materialized`].
    pub fn data_malloc(&mut self) -> Result<AllocatorStats, GraphError> {
        if !self.topo_sort() {
            return Err(GraphError::Cycle);
        }
        if self.tensors.is_empty() {
            log::warn!("planning memory for a graph without tensors");
        }

        let total = self
            .tensors
            .values()
            .map(Tensor::checked_bytes)
            .try_fold(0usize, |acc, bytes| acc.checked_add(bytes?))
            .ok_or(AllocError::OutOfMemory {
                requested: usize::MAX,
                largest_free: self.allocator.largest_free_block(),
            })?;

        let base = self.allocator.alloc(total)?;
        let buffer = self.allocator.materialize()?;

        let mut offset = base;
        for tensor in self.tensors.values_mut() {
            let len = tensor.bytes();
            tensor.set_data(DataBlob::new(buffer, offset, len));
            offset += len;
        }

        log::info!(
            "planned {} bytes for {} tensors in a {} byte buffer",
            total,
            self.tensors.len(),
            buffer.size()
        );
        Ok(self.allocator.info())
    }
}
