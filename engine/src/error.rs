//! Error types for the engine.

use std::fmt;

use tensorplan_runtime::RuntimeError;

use crate::ids::{Fuid, OpId, TensorId};
use crate::ops::OpType;

/// Errors raised by the arena [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// No free block is large enough for the (aligned) request
    OutOfMemory { requested: usize, largest_free: usize },

    /// `free` of a range that cannot lie inside the arena
    InvalidFree { addr: usize, size: usize },

    /// `alloc`/`free` called after the physical buffer was obtained
    Materialized { operation: &'static str },

    /// The backing-store provider failed to hand out the buffer
    Runtime(RuntimeError),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory {
                requested,
                largest_free,
            } => write!(
                f,
                "Out of memory: requested {} bytes, largest free block is {} bytes",
                requested, largest_free
            ),
            AllocError::InvalidFree { addr, size } => write!(
                f,
                "Cannot free {} bytes at {}: range lies outside the arena",
                size, addr
            ),
            AllocError::Materialized { operation } => write!(
                f,
                "Cannot {} after the backing buffer has been materialized",
                operation
            ),
            AllocError::Runtime(err) => write!(f, "Backing store error: {}", err),
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuntimeError> for AllocError {
    fn from(err: RuntimeError) -> Self {
        AllocError::Runtime(err)
    }
}

/// Errors from operator shape inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// Wrong number of input shapes handed to the inference function
    InputCount { expected: usize, found: usize },

    /// Input has fewer axes than the operator needs
    RankTooSmall { input: usize, rank: usize, required: usize },

    /// Two dimensions are neither equal nor 1
    Broadcast { lhs: Vec<usize>, rhs: Vec<usize> },

    /// MatMul contracted dimensions disagree
    ContractionMismatch { lhs: usize, rhs: usize },

    /// Transpose permutation is not a bijection over the input axes
    InvalidPermutation { permutation: Vec<usize>, rank: usize },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::InputCount { expected, found } => {
                write!(f, "Expected {} input shapes, found {}", expected, found)
            }
            ShapeError::RankTooSmall {
                input,
                rank,
                required,
            } => write!(
                f,
                "Input {} has rank {}, at least {} required",
                input, rank, required
            ),
            ShapeError::Broadcast { lhs, rhs } => {
                write!(f, "Shapes {:?} and {:?} cannot be broadcast", lhs, rhs)
            }
            ShapeError::ContractionMismatch { lhs, rhs } => {
                write!(f, "Contracted dimensions differ: {} vs {}", lhs, rhs)
            }
            ShapeError::InvalidPermutation { permutation, rank } => write!(
                f,
                "Permutation {:?} is not valid for rank {}",
                permutation, rank
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// A broken graph invariant found by [`Graph::check_valid`](crate::Graph::check_valid).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Tensor has neither a source nor any target
    OrphanedTensor { tensor: TensorId },

    /// Operator references a tensor that is not in the graph
    DanglingTensor { op: OpId, tensor: TensorId },

    /// Tensor source or target is not in the graph
    DanglingEndpoint { tensor: TensorId, op: OpId },

    /// Predecessor or successor is not in the graph
    DanglingNeighbour { op: OpId, neighbour: OpId },

    /// Stored predecessor/successor sets disagree with tensor edges
    InconsistentEdges { op: OpId, reason: String },

    /// Two tensors share a logical id
    DuplicateFuid { fuid: Fuid },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValidationErrorKind::OrphanedTensor { tensor } => {
                write!(f, "Tensor {} has no source and no targets", tensor)
            }
            ValidationErrorKind::DanglingTensor { op, tensor } => {
                write!(f, "Operator {} references missing tensor {}", op, tensor)
            }
            ValidationErrorKind::DanglingEndpoint { tensor, op } => {
                write!(f, "Tensor {} is linked to missing operator {}", tensor, op)
            }
            ValidationErrorKind::DanglingNeighbour { op, neighbour } => {
                write!(f, "Operator {} is linked to missing operator {}", op, neighbour)
            }
            ValidationErrorKind::InconsistentEdges { op, reason } => {
                write!(f, "Operator {} has inconsistent edges: {}", op, reason)
            }
            ValidationErrorKind::DuplicateFuid { fuid } => {
                write!(f, "More than one tensor has fuid {}", fuid)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationErrorKind> for ValidationError {
    fn from(kind: ValidationErrorKind) -> Self {
        Self { kind }
    }
}

/// Errors from graph construction and compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownTensor(TensorId),

    UnknownOperator(OpId),

    /// Operator was given the wrong number of inputs or outputs
    Arity {
        op_type: OpType,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Output tensor already has a producing operator
    AlreadyProduced { tensor: TensorId, producer: OpId },

    /// Topological sort found a cycle
    Cycle,

    /// Shape inference failed for an operator
    Shape { op: OpId, source: ShapeError },

    /// Shape inference returned the wrong number of shapes
    OutputCount { op: OpId, expected: usize, found: usize },

    Validation(ValidationError),

    Alloc(AllocError),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownTensor(id) => write!(f, "Tensor {} is not in the graph", id),
            GraphError::UnknownOperator(id) => write!(f, "Operator {} is not in the graph", id),
            GraphError::Arity {
                op_type,
                expected,
                found,
            } => write!(
                f,
                "{} takes {} inputs and {} outputs, got {} and {}",
                op_type, expected.0, expected.1, found.0, found.1
            ),
            GraphError::AlreadyProduced { tensor, producer } => {
                write!(f, "Tensor {} is already produced by {}", tensor, producer)
            }
            GraphError::Cycle => write!(f, "Graph contains a cycle"),
            GraphError::Shape { op, source } => {
                write!(f, "Shape inference failed for {}: {}", op, source)
            }
            GraphError::OutputCount {
                op,
                expected,
                found,
            } => write!(
                f,
                "Shape inference for {} produced {} shapes for {} outputs",
                op, found, expected
            ),
            GraphError::Validation(err) => write!(f, "Invalid graph: {}", err),
            GraphError::Alloc(err) => write!(f, "Memory planning failed: {}", err),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Shape { source, .. } => Some(source),
            GraphError::Validation(err) => Some(err),
            GraphError::Alloc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for GraphError {
    fn from(err: ValidationError) -> Self {
        GraphError::Validation(err)
    }
}

impl From<AllocError> for GraphError {
    fn from(err: AllocError) -> Self {
        GraphError::Alloc(err)
    }
}
