//! Operator nodes and the capability contract every operator kind satisfies.
//!
//! An [`Operator`] is the graph-side node: identity, ordered input/output
//! tensor lists and predecessor/successor links. What the operator *computes*
//! lives behind [`OpDef`], which only has to report its type, its arity and
//! infer output shapes. Kinds that take part in rewrites also expose their
//! permutation or accept a transpose flag toggle.

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;

use crate::error::ShapeError;
use crate::ids::{Guid, OpId, TensorId};
use crate::tensor::Shape;

pub mod element_wise;
pub mod matmul;
pub mod transpose;
pub mod unary;

pub use element_wise::{BinaryKind, ElementWise};
pub use matmul::MatMul;
pub use transpose::Transpose;
pub use unary::{Unary, UnaryKind};

/// Operator type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpType {
    MatMul,
    Transpose,
    Add,
    Sub,
    Mul,
    Div,
    Relu,
    Sigmoid,
    Tanh,
    Abs,
    /// Operator kinds defined outside this crate
    Custom(&'static str),
}

impl OpType {
    pub fn name(self) -> &'static str {
        match self {
            Self::MatMul => "MatMul",
            Self::Transpose => "Transpose",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Relu => "Relu",
            Self::Sigmoid => "Sigmoid",
            Self::Tanh => "Tanh",
            Self::Abs => "Abs",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an operator computes, as far as the graph engine cares.
pub trait OpDef: fmt::Debug {
    fn op_type(&self) -> OpType;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize {
        1
    }

    /// One output shape per output, or the reason there is none.
    fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<Shape>, ShapeError>;

    /// Axis permutation, for kinds that reorder axes.
    fn permutation(&self) -> Option<&[usize]> {
        None
    }

    /// Flip the "operand is transposed" attribute of input `operand`.
    ///
    /// Returns `false` when the kind has no such attribute.
    fn toggle_operand_transpose(&mut self, _operand: usize) -> bool {
        false
    }

    /// Attribute summary for dumps, e.g. `perm=[1, 0]`.
    fn attributes(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Check the number of input shapes handed to `infer_shape`.
pub(crate) fn expect_inputs(inputs: &[&[usize]], expected: usize) -> Result<(), ShapeError> {
    if inputs.len() != expected {
        return Err(ShapeError::InputCount {
            expected,
            found: inputs.len(),
        });
    }
    Ok(())
}

pub type TensorList = SmallVec<[TensorId; 2]>;

/// A computation node in the graph.
///
/// `predecessors`/`successors` mirror the tensor edges: an operator's
/// predecessors are the sources of its inputs, its successors the targets of
/// its outputs. The graph keeps both views in step.
#[derive(Debug)]
pub struct Operator {
    id: OpId,
    inputs: TensorList,
    outputs: TensorList,
    predecessors: IndexSet<OpId>,
    successors: IndexSet<OpId>,
    def: Box<dyn OpDef>,
}

impl Operator {
    pub(crate) fn new(
        id: OpId,
        def: Box<dyn OpDef>,
        inputs: TensorList,
        outputs: TensorList,
    ) -> Self {
        Self {
            id,
            inputs,
            outputs,
            predecessors: IndexSet::new(),
            successors: IndexSet::new(),
            def,
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn guid(&self) -> Guid {
        self.id.guid()
    }

    pub fn op_type(&self) -> OpType {
        self.def.op_type()
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn predecessors(&self) -> &IndexSet<OpId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &IndexSet<OpId> {
        &self.successors
    }

    pub fn def(&self) -> &dyn OpDef {
        self.def.as_ref()
    }

    pub(crate) fn def_mut(&mut self) -> &mut dyn OpDef {
        self.def.as_mut()
    }

    /// Downcast the definition to a concrete kind.
    pub fn downcast_ref<T: OpDef + 'static>(&self) -> Option<&T> {
        self.def.as_any().downcast_ref::<T>()
    }

    /// Replace every occurrence of `old` in the input list.
    pub(crate) fn replace_input(&mut self, old: TensorId, new: TensorId) {
        for input in self.inputs.iter_mut().filter(|t| **t == old) {
            *input = new;
        }
    }

    pub(crate) fn set_input(&mut self, slot: usize, tensor: TensorId) {
        self.inputs[slot] = tensor;
    }

    pub(crate) fn add_predecessor(&mut self, op: OpId) {
        self.predecessors.insert(op);
    }

    pub(crate) fn add_successor(&mut self, op: OpId) {
        self.successors.insert(op);
    }

    pub(crate) fn set_predecessors(&mut self, ops: IndexSet<OpId>) {
        self.predecessors = ops;
    }

    pub(crate) fn set_successors(&mut self, ops: IndexSet<OpId>) {
        self.successors = ops;
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<_> = self.inputs.iter().map(|t| t.guid().as_u64()).collect();
        let outputs: Vec<_> = self.outputs.iter().map(|t| t.guid().as_u64()).collect();
        write!(f, "{}", self.op_type())?;
        let attrs = self.def.attributes();
        if !attrs.is_empty() {
            write!(f, "[{}]", attrs)?;
        }
        write!(f, "(inputs={:?}, outputs={:?})", inputs, outputs)
    }
}
