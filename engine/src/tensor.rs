//! Tensor nodes of the computation graph.

use indexmap::IndexSet;
use std::fmt;

use tensorplan_runtime::BufferHandle;

use crate::dtype::DataType;
use crate::ids::{Fuid, Guid, OpId, TensorId};

/// Ordered dimension sizes.
pub type Shape = Vec<usize>;

/// Memory bound to a tensor after materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlob {
    buffer: BufferHandle,
    offset: usize,
    len: usize,
}

impl DataBlob {
    pub fn new(buffer: BufferHandle, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= buffer.size(), "blob outside its buffer");
        Self {
            buffer,
            offset,
            len,
        }
    }

    /// Address of the first byte.
    pub fn as_ptr(&self) -> *mut u8 {
        self.buffer.as_ptr().wrapping_add(self.offset)
    }

    /// Offset inside the shared buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer this blob lives in.
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }
}

/// A data buffer in the graph.
///
/// Tensors hold non-owning links to operators: the single producing operator
/// (`source`, absent for graph inputs) and the set of consumers (`targets`).
#[derive(Debug, Clone)]
pub struct Tensor {
    id: TensorId,
    fuid: Fuid,
    shape: Shape,
    dtype: DataType,
    source: Option<OpId>,
    targets: IndexSet<OpId>,
    data: Option<DataBlob>,
}

impl Tensor {
    pub(crate) fn new(id: TensorId, fuid: Fuid, shape: Shape, dtype: DataType) -> Self {
        Self {
            id,
            fuid,
            shape,
            dtype,
            source: None,
            targets: IndexSet::new(),
            data: None,
        }
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn guid(&self) -> Guid {
        self.id.guid()
    }

    pub fn fuid(&self) -> Fuid {
        self.fuid
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Element count. A rank-0 tensor holds one element.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Storage size in bytes.
    ///
    /// Wraps on shapes too large for `usize`; planning uses
    /// [`Tensor::checked_bytes`].
    pub fn bytes(&self) -> usize {
        self.numel() * self.dtype.size()
    }

    /// Element count, `None` on overflow.
    pub fn checked_numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Storage size in bytes, `None` on overflow.
    pub fn checked_bytes(&self) -> Option<usize> {
        self.checked_numel()?.checked_mul(self.dtype.size())
    }

    pub fn source(&self) -> Option<OpId> {
        self.source
    }

    pub fn targets(&self) -> &IndexSet<OpId> {
        &self.targets
    }

    pub fn data(&self) -> Option<&DataBlob> {
        self.data.as_ref()
    }

    /// Neither produced nor consumed by anything.
    pub fn is_orphaned(&self) -> bool {
        self.source.is_none() && self.targets.is_empty()
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub(crate) fn set_source(&mut self, op: Option<OpId>) {
        self.source = op;
    }

    pub(crate) fn add_target(&mut self, op: OpId) {
        self.targets.insert(op);
    }

    pub(crate) fn remove_target(&mut self, op: OpId) -> bool {
        self.targets.shift_remove(&op)
    }

    pub(crate) fn set_data(&mut self, blob: DataBlob) {
        self.data = Some(blob);
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor {}, Fuid {}, shape {:?}, dtype {}, source ",
            self.guid(),
            self.fuid,
            self.shape,
            self.dtype
        )?;
        match self.source {
            Some(op) => write!(f, "{}", op.guid())?,
            None => write!(f, "None")?,
        }
        let targets: Vec<_> = self.targets.iter().map(|op| op.guid().as_u64()).collect();
        write!(f, ", targets {:?}", targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdGenerator;

    fn tensor(shape: &[usize], dtype: DataType) -> Tensor {
        let ids = IdGenerator::new();
        Tensor::new(ids.next_tensor_id(), ids.next_fuid(), shape.to_vec(), dtype)
    }

    #[test]
    fn test_bytes() {
        assert_eq!(tensor(&[2, 3, 4], DataType::Float32).bytes(), 96);
        assert_eq!(tensor(&[5], DataType::Int64).bytes(), 40);
        assert_eq!(tensor(&[], DataType::UInt8).bytes(), 1);
        assert_eq!(tensor(&[4, 0], DataType::Float32).bytes(), 0);
    }

    #[test]
    fn test_checked_bytes() {
        assert_eq!(tensor(&[2, 3, 4], DataType::Float32).checked_bytes(), Some(96));
        assert_eq!(tensor(&[], DataType::Int64).checked_bytes(), Some(8));
        assert_eq!(tensor(&[usize::MAX / 2, 3], DataType::Float32).checked_numel(), None);
        assert_eq!(tensor(&[usize::MAX / 2], DataType::Float32).checked_bytes(), None);
        assert_eq!(tensor(&[usize::MAX, 0], DataType::Float32).checked_bytes(), Some(0));
    }

    #[test]
    fn test_edges() {
        let ids = IdGenerator::starting_at(100, 1);
        let mut t = tensor(&[2], DataType::Float32);
        assert!(t.is_orphaned());

        let producer = ids.next_op_id();
        let consumer = ids.next_op_id();
        t.set_source(Some(producer));
        t.add_target(consumer);
        t.add_target(consumer);
        assert_eq!(t.targets().len(), 1);
        assert!(!t.is_orphaned());

        assert!(t.remove_target(consumer));
        assert!(!t.remove_target(consumer));
    }

    #[test]
    fn test_display() {
        let t = tensor(&[2, 3], DataType::Float32);
        assert_eq!(
            t.to_string(),
            "Tensor 1, Fuid f1, shape [2, 3], dtype f32, source None, targets []"
        );
    }
}
