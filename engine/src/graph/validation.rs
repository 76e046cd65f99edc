//! Structural consistency checks.

use fxhash::FxHashSet;
use indexmap::IndexSet;

use super::Graph;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::ids::{Fuid, OpId};

impl Graph {
    /// Re-derive every structural invariant and report the first violation.
    ///
    /// Checked, in order: tensors are reachable and their endpoints exist,
    /// fuids are unique, operators reference existing tensors and operators,
    /// and each operator's predecessor/successor sets match what its tensor
    /// edges imply.
    pub fn check_valid(&self) -> Result<(), ValidationError> {
        let mut fuids: FxHashSet<Fuid> = FxHashSet::default();

        for tensor in self.tensors.values() {
            let id = tensor.id();
            if tensor.is_orphaned() {
                return Err(ValidationErrorKind::OrphanedTensor { tensor: id }.into());
            }
            for op in tensor.source().into_iter().chain(tensor.targets().iter().copied()) {
                if !self.operators.contains_key(&op) {
                    return Err(ValidationErrorKind::DanglingEndpoint { tensor: id, op }.into());
                }
            }
            if !fuids.insert(tensor.fuid()) {
                return Err(ValidationErrorKind::DuplicateFuid {
                    fuid: tensor.fuid(),
                }
                .into());
            }
        }

        for op in self.operators.values() {
            let id = op.id();
            for &t in op.inputs().iter().chain(op.outputs()) {
                if !self.tensors.contains_key(&t) {
                    return Err(ValidationErrorKind::DanglingTensor { op: id, tensor: t }.into());
                }
            }
            for &neighbour in op.predecessors().iter().chain(op.successors()) {
                if !self.operators.contains_key(&neighbour) {
                    return Err(ValidationErrorKind::DanglingNeighbour { op: id, neighbour }.into());
                }
            }
            self.check_edges(id)?;
        }

        Ok(())
    }

    fn check_edges(&self, id: OpId) -> Result<(), ValidationError> {
        let op = &self.operators[&id];
        let inconsistent = |reason: String| -> ValidationError {
            ValidationErrorKind::InconsistentEdges { op: id, reason }.into()
        };

        for t in op.inputs() {
            if !self.tensors[t].targets().contains(&id) {
                return Err(inconsistent(format!("input {} does not list it as a target", t)));
            }
        }
        for t in op.outputs() {
            if self.tensors[t].source() != Some(id) {
                return Err(inconsistent(format!("output {} has a different source", t)));
            }
        }

        let predecessors: IndexSet<OpId> = op
            .inputs()
            .iter()
            .filter_map(|t| self.tensors[t].source())
            .collect();
        if !same_members(&predecessors, op.predecessors()) {
            return Err(inconsistent(format!(
                "predecessors {:?}, tensor edges imply {:?}",
                op.predecessors(),
                predecessors
            )));
        }

        let successors: IndexSet<OpId> = op
            .outputs()
            .iter()
            .flat_map(|t| self.tensors[t].targets().iter().copied())
            .collect();
        if !same_members(&successors, op.successors()) {
            return Err(inconsistent(format!(
                "successors {:?}, tensor edges imply {:?}",
                op.successors(),
                successors
            )));
        }

        Ok(())
    }
}

fn same_members(a: &IndexSet<OpId>, b: &IndexSet<OpId>) -> bool {
    a.len() == b.len() && a.iter().all(|id| b.contains(id))
}
