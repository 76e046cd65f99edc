//! Binary element-wise arithmetic with broadcasting.

use std::any::Any;

use super::{expect_inputs, OpDef, OpType};
use crate::error::ShapeError;
use crate::shape::infer_broadcast;
use crate::tensor::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementWise {
    kind: BinaryKind,
}

impl ElementWise {
    pub fn new(kind: BinaryKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> BinaryKind {
        self.kind
    }
}

impl OpDef for ElementWise {
    fn op_type(&self) -> OpType {
        match self.kind {
            BinaryKind::Add => OpType::Add,
            BinaryKind::Sub => OpType::Sub,
            BinaryKind::Mul => OpType::Mul,
            BinaryKind::Div => OpType::Div,
        }
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<Shape>, ShapeError> {
        expect_inputs(inputs, 2)?;
        Ok(vec![infer_broadcast(inputs[0], inputs[1])?])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
