//! Shape propagation.

use super::Graph;
use crate::error::GraphError;
use crate::ids::Fuid;
use crate::tensor::Shape;

impl Graph {
    /// Recompute every operator's output shapes in topological order.
    ///
    /// Outputs are resolved by fuid, so a tensor replaced by a rewrite is still
    /// found. Returns the number of tensors whose shape changed.
    pub fn shape_infer(&mut self) -> Result<usize, GraphError> {
        if !self.topo_sort() {
            return Err(GraphError::Cycle);
        }

        let mut updated = 0;
        for id in self.op_ids() {
            let op = self.operators.get(&id).ok_or(GraphError::UnknownOperator(id))?;

            let mut inputs = Vec::with_capacity(op.inputs().len());
            for t in op.inputs() {
                inputs.push(self.tensors.get(t).ok_or(GraphError::UnknownTensor(*t))?.shape());
            }
            let shapes = op
                .def()
                .infer_shape(&inputs)
                .map_err(|source| GraphError::Shape { op: id, source })?;
            if shapes.len() != op.outputs().len() {
                return Err(GraphError::OutputCount {
                    op: id,
                    expected: op.outputs().len(),
                    found: shapes.len(),
                });
            }

            let mut changes: Vec<(Fuid, Shape)> = Vec::new();
            for (t, shape) in op.outputs().iter().zip(shapes) {
                let tensor = self.tensors.get(t).ok_or(GraphError::UnknownTensor(*t))?;
                if tensor.shape() != shape.as_slice() {
                    changes.push((tensor.fuid(), shape));
                }
            }

            for (fuid, shape) in changes {
                if let Some(tensor) = self.tensors.values_mut().find(|t| t.fuid() == fuid) {
                    log::trace!("{} ({}): {:?} -> {:?}", tensor.id(), fuid, tensor.shape(), shape);
                    tensor.set_shape(shape);
                    updated += 1;
                }
            }
        }

        log::debug!("shape inference updated {} tensors", updated);
        Ok(updated)
    }
}
