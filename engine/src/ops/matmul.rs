//! Batched matrix multiplication.
//!
//! `C = op(A) x op(B)` where `op` optionally swaps the last two axes. Leading
//! axes are batch axes and broadcast against each other.

use std::any::Any;

use super::{expect_inputs, OpDef, OpType};
use crate::error::ShapeError;
use crate::shape::infer_broadcast;
use crate::tensor::Shape;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatMul {
    pub trans_a: bool,
    pub trans_b: bool,
}

impl MatMul {
    pub fn new(trans_a: bool, trans_b: bool) -> Self {
        Self { trans_a, trans_b }
    }

    /// `(m, n, k)` for the given operand shapes, honouring the transpose flags.
    pub fn mnk(&self, a: &[usize], b: &[usize]) -> Result<(usize, usize, usize), ShapeError> {
        let (ra, rb) = (a.len(), b.len());
        if ra < 2 {
            return Err(ShapeError::RankTooSmall {
                input: 0,
                rank: ra,
                required: 2,
            });
        }
        if rb < 2 {
            return Err(ShapeError::RankTooSmall {
                input: 1,
                rank: rb,
                required: 2,
            });
        }

        let (m, ka) = if self.trans_a {
            (a[ra - 1], a[ra - 2])
        } else {
            (a[ra - 2], a[ra - 1])
        };
        let (kb, n) = if self.trans_b {
            (b[rb - 1], b[rb - 2])
        } else {
            (b[rb - 2], b[rb - 1])
        };

        if ka != kb {
            return Err(ShapeError::ContractionMismatch { lhs: ka, rhs: kb });
        }
        Ok((m, n, ka))
    }
}

impl OpDef for MatMul {
    fn op_type(&self) -> OpType {
        OpType::MatMul
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<Shape>, ShapeError> {
        expect_inputs(inputs, 2)?;
        let (a, b) = (inputs[0], inputs[1]);
        let (m, n, _) = self.mnk(a, b)?;

        let mut out = infer_broadcast(&a[..a.len() - 2], &b[..b.len() - 2])?;
        out.push(m);
        out.push(n);
        Ok(vec![out])
    }

    fn toggle_operand_transpose(&mut self, operand: usize) -> bool {
        match operand {
            0 => self.trans_a = !self.trans_a,
            1 => self.trans_b = !self.trans_b,
            _ => return false,
        }
        true
    }

    fn attributes(&self) -> String {
        format!(
            "{},{}",
            if self.trans_a { "A^T" } else { "A" },
            if self.trans_b { "B^T" } else { "B" }
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
