//! Topological ordering of the operator table.

use fxhash::FxHashSet;

use super::Graph;
use crate::ids::OpId;
use crate::tensor::Tensor;

impl Graph {
    /// Reorder operators so every one follows the producers of its inputs.
    ///
    /// Each pass appends every operator whose inputs are graph inputs or come
    /// from already placed operators. Returns `false`, leaving the table
    /// untouched, when a pass places nothing (the graph has a cycle).
    pub fn topo_sort(&mut self) -> bool {
        if self.sorted {
            return true;
        }

        let mut order: Vec<OpId> = Vec::with_capacity(self.operators.len());
        let mut placed: FxHashSet<OpId> = FxHashSet::default();

        while order.len() < self.operators.len() {
            let mut progressed = false;

            for (&id, op) in &self.operators {
                if placed.contains(&id) {
                    continue;
                }
                let ready = op.inputs().iter().all(|t| {
                    match self.tensors.get(t).and_then(Tensor::source) {
                        Some(producer) => placed.contains(&producer),
                        None => true,
                    }
                });
                if ready {
                    order.push(id);
                    placed.insert(id);
                    progressed = true;
                }
            }

            if !progressed {
                log::debug!(
                    "topo sort stalled with {} of {} operators placed",
                    order.len(),
                    self.operators.len()
                );
                return false;
            }
        }

        let mut unordered = std::mem::take(&mut self.operators);
        self.operators = order
            .into_iter()
            .filter_map(|id| unordered.swap_remove(&id).map(|op| (id, op)))
            .collect();
        self.sorted = true;
        true
    }
}
