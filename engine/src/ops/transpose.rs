//! Axis permutation.

use std::any::Any;

use super::{expect_inputs, OpDef, OpType};
use crate::error::ShapeError;
use crate::shape::is_valid_permutation;
use crate::tensor::Shape;

/// `out.shape[i] = in.shape[perm[i]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpose {
    permutation: Vec<usize>,
}

impl Transpose {
    pub fn new(permutation: Vec<usize>) -> Self {
        Self { permutation }
    }

    /// Swap the last two of `rank` axes.
    pub fn last_two(rank: usize) -> Self {
        let mut permutation: Vec<usize> = (0..rank).collect();
        if rank >= 2 {
            permutation.swap(rank - 2, rank - 1);
        }
        Self { permutation }
    }

    pub fn perm(&self) -> &[usize] {
        &self.permutation
    }
}

impl OpDef for Transpose {
    fn op_type(&self) -> OpType {
        OpType::Transpose
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<Shape>, ShapeError> {
        expect_inputs(inputs, 1)?;
        let input = inputs[0];
        if !is_valid_permutation(&self.permutation, input.len()) {
            return Err(ShapeError::InvalidPermutation {
                permutation: self.permutation.clone(),
                rank: input.len(),
            });
        }
        Ok(vec![self.permutation.iter().map(|&axis| input[axis]).collect()])
    }

    fn permutation(&self) -> Option<&[usize]> {
        Some(&self.permutation)
    }

    fn attributes(&self) -> String {
        format!("perm={:?}", self.permutation)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
