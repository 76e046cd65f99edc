//! Shape-preserving unary activations.

use std::any::Any;

use super::{expect_inputs, OpDef, OpType};
use crate::error::ShapeError;
use crate::tensor::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Relu,
    Sigmoid,
    Tanh,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unary {
    kind: UnaryKind,
}

impl Unary {
    pub fn new(kind: UnaryKind) -> Self {
        Self { kind }
    }

    pub fn relu() -> Self {
        Self::new(UnaryKind::Relu)
    }

    pub fn kind(&self) -> UnaryKind {
        self.kind
    }
}

impl OpDef for Unary {
    fn op_type(&self) -> OpType {
        match self.kind {
            UnaryKind::Relu => OpType::Relu,
            UnaryKind::Sigmoid => OpType::Sigmoid,
            UnaryKind::Tanh => OpType::Tanh,
            UnaryKind::Abs => OpType::Abs,
        }
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<Shape>, ShapeError> {
        expect_inputs(inputs, 1)?;
        Ok(vec![inputs[0].to_vec()])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_shape() {
        let relu = Unary::relu();
        assert_eq!(relu.op_type(), OpType::Relu);
        assert_eq!(relu.infer_shape(&[&[2, 7]]).unwrap(), vec![vec![2, 7]]);
    }
}
