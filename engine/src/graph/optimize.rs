//! Peephole rewrites over the operator graph.
//!
//! The [`Optimizer`] walks a snapshot of the topologically sorted operator
//! list once and offers each operator to every configured [`RewriteRule`].
//! Rules rewire tensors immediately but never delete operators; they schedule
//! them in [`PendingRemovals`] instead, and the optimizer removes them after
//! the scan. Operators rewired by a rewrite are marked as touched and no rule
//! matches on them again during the same scan, so opportunities created by a
//! rewrite wait for the next run.
//!
//! Rules shipped here:
//! - [`InverseTransposeElimination`]: `Transpose(p2) . Transpose(p1)` with
//!   `p2 . p1 = id` becomes a direct edge.
//! - [`TransposeMatMulFusion`]: a last-two-axis transpose feeding one MatMul
//!   operand folds into that operand's transpose flag.

use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use std::collections::HashMap;

use super::Graph;
use crate::config::OptimizerConfig;
use crate::error::GraphError;
use crate::ids::{OpId, TensorId};
use crate::ops::OpType;
use crate::shape::{composes_to_identity, is_last_two_swap};

/// A local graph rewrite.
pub trait RewriteRule {
    /// Get the name of this rule
    fn name(&self) -> &'static str;

    /// Try to rewrite around `op`. Returns whether the graph changed.
    ///
    /// Operators made redundant go into `pending`; the rule must not remove
    /// operators itself.
    fn apply(&self, graph: &mut Graph, op: OpId, pending: &mut PendingRemovals) -> bool;
}

/// Operators scheduled for removal once the scan finishes, plus the
/// operators whose inputs were rewired during the scan.
#[derive(Debug, Default)]
pub struct PendingRemovals {
    operators: IndexSet<OpId, FxBuildHasher>,
    touched: IndexSet<OpId, FxBuildHasher>,
    tensors_removed: usize,
}

impl PendingRemovals {
    pub fn schedule(&mut self, op: OpId) {
        self.operators.insert(op);
    }

    pub fn contains(&self, op: OpId) -> bool {
        self.operators.contains(&op)
    }

    /// Mark `op` as rewired. Rules skip it for the rest of the scan.
    pub fn touch(&mut self, op: OpId) {
        self.touched.insert(op);
    }

    pub fn is_touched(&self, op: OpId) -> bool {
        self.touched.contains(&op)
    }

    /// Count tensors a rule dropped from the graph.
    pub fn record_tensors(&mut self, count: usize) {
        self.tensors_removed += count;
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Result of an optimizer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeResult {
    /// Whether the graph was modified
    pub modified: bool,

    pub operators_eliminated: usize,

    pub tensors_eliminated: usize,

    /// Successful rewrites per rule name
    pub stats: HashMap<String, usize>,
}

impl OptimizeResult {
    pub fn unchanged() -> Self {
        Self {
            modified: false,
            operators_eliminated: 0,
            tensors_eliminated: 0,
            stats: HashMap::new(),
        }
    }

    pub fn combine(mut self, other: OptimizeResult) -> Self {
        self.modified |= other.modified;
        self.operators_eliminated += other.operators_eliminated;
        self.tensors_eliminated += other.tensors_eliminated;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }

    /// Rewrites performed by the rule called `name`.
    pub fn count(&self, name: &str) -> usize {
        self.stats.get(name).copied().unwrap_or(0)
    }
}

/// Ordered list of rewrite rules applied in one scan.
pub struct Optimizer {
    rules: Vec<Box<dyn RewriteRule>>,
}

impl Optimizer {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule<R: RewriteRule + 'static>(&mut self, rule: R) {
        self.rules.push(Box::new(rule));
    }

    /// Both built-in rules.
    pub fn default_rules() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        let mut optimizer = Self::new();
        if config.eliminate_inverse_transposes {
            optimizer.add_rule(InverseTransposeElimination);
        }
        if config.fuse_transpose_into_matmul {
            optimizer.add_rule(TransposeMatMulFusion);
        }
        optimizer
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Sort `graph`, scan it once and apply the scheduled removals.
    pub fn run(&self, graph: &mut Graph) -> Result<OptimizeResult, GraphError> {
        if !graph.topo_sort() {
            return Err(GraphError::Cycle);
        }

        let order = graph.op_ids();
        let mut pending = PendingRemovals::default();
        let mut result = OptimizeResult::unchanged();

        for id in order {
            for rule in &self.rules {
                if pending.contains(id) {
                    break;
                }
                if rule.apply(graph, id, &mut pending) {
                    result.modified = true;
                    *result.stats.entry(rule.name().to_string()).or_insert(0) += 1;
                }
            }
        }

        for &id in &pending.operators {
            graph.remove_operator(id);
        }
        result.operators_eliminated = pending.len();
        result.tensors_eliminated = pending.tensors_removed;

        tracing::debug!(
            modified = result.modified,
            operators_eliminated = result.operators_eliminated,
            tensors_eliminated = result.tensors_eliminated,
            "optimizer finished"
        );
        Ok(result)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::default_rules()
    }
}

/// Removes a pair of transposes whose permutations cancel out.
///
/// Given `x -> pre -> mid -> op -> y -> consumers`, consumers read `x`
/// directly and `pre`, `op`, `mid` and `y` go away. The rule holds off when
/// `mid` feeds anything besides `op` or when `y` has no consumer, since either
/// would leave a tensor without a producer or drop a graph output.
#[derive(Debug, Default, Clone, Copy)]
pub struct InverseTransposeElimination;

struct InversePair {
    pre: OpId,
    source: TensorId,
    mid: TensorId,
    output: TensorId,
    consumers: Vec<OpId>,
}

impl InverseTransposeElimination {
    fn match_pair(&self, graph: &Graph, id: OpId, pending: &PendingRemovals) -> Option<InversePair> {
        if pending.is_touched(id) {
            return None;
        }
        let op = graph.operator(id)?;
        if op.op_type() != OpType::Transpose || op.predecessors().len() != 1 {
            return None;
        }
        let pre_id = *op.predecessors().first()?;
        if pending.contains(pre_id) {
            return None;
        }
        let pre = graph.operator(pre_id)?;
        if pre.op_type() != OpType::Transpose {
            return None;
        }
        if !composes_to_identity(pre.def().permutation()?, op.def().permutation()?) {
            return None;
        }

        let (&[mid], &[output]) = (op.inputs(), op.outputs()) else {
            return None;
        };
        let (&[source], &[pre_out]) = (pre.inputs(), pre.outputs()) else {
            return None;
        };
        if pre_out != mid {
            return None;
        }

        let mid_tensor = graph.tensor(mid)?;
        if mid_tensor.targets().len() != 1 || !mid_tensor.targets().contains(&id) {
            return None;
        }
        let consumers: Vec<OpId> = graph.tensor(output)?.targets().iter().copied().collect();
        if consumers.is_empty() {
            return None;
        }

        Some(InversePair {
            pre: pre_id,
            source,
            mid,
            output,
            consumers,
        })
    }
}

impl RewriteRule for InverseTransposeElimination {
    fn name(&self) -> &'static str {
        "inverse-transpose-elimination"
    }

    fn apply(&self, graph: &mut Graph, id: OpId, pending: &mut PendingRemovals) -> bool {
        let Some(pair) = self.match_pair(graph, id, pending) else {
            return false;
        };

        if let Some(source) = graph.tensor_mut(pair.source) {
            source.remove_target(pair.pre);
        }
        for &consumer in &pair.consumers {
            if let Some(op) = graph.operator_mut(consumer) {
                op.replace_input(pair.output, pair.source);
            }
            if let Some(source) = graph.tensor_mut(pair.source) {
                source.add_target(consumer);
            }
        }
        graph.remove_tensor(pair.output);
        graph.remove_tensor(pair.mid);

        if let Some(producer) = graph.tensor(pair.source).and_then(|t| t.source()) {
            graph.refresh_edges(producer);
        }
        for &consumer in &pair.consumers {
            graph.refresh_edges(consumer);
        }

        for &consumer in &pair.consumers {
            pending.touch(consumer);
        }
        pending.schedule(pair.pre);
        pending.schedule(id);
        pending.record_tensors(2);

        log::debug!(
            "eliminated inverse transposes {} and {}, {} now feeds {:?}",
            pair.pre,
            id,
            pair.source,
            pair.consumers
        );
        true
    }
}

/// Folds a last-two-axis transpose into the MatMul operand it feeds.
///
/// `MatMul(Transpose(x), b)` becomes `MatMul(x, b)` with `trans_a` flipped,
/// and symmetrically for the right operand. A transposed tensor that feeds
/// both operands is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransposeMatMulFusion;

struct FusibleOperand {
    transpose: OpId,
    transposed: TensorId,
    source: TensorId,
}

impl TransposeMatMulFusion {
    fn match_operand(
        &self,
        graph: &Graph,
        id: OpId,
        slot: usize,
        pending: &PendingRemovals,
    ) -> Option<FusibleOperand> {
        let op = graph.operator(id)?;
        let transposed = *op.inputs().get(slot)?;
        if op.inputs().iter().filter(|&&t| t == transposed).count() != 1 {
            return None;
        }

        let tensor = graph.tensor(transposed)?;
        if tensor.targets().len() != 1 || !tensor.targets().contains(&id) {
            return None;
        }
        let transpose_id = tensor.source()?;
        if pending.contains(transpose_id) {
            return None;
        }

        let transpose = graph.operator(transpose_id)?;
        if transpose.op_type() != OpType::Transpose {
            return None;
        }
        if !is_last_two_swap(transpose.def().permutation()?) {
            return None;
        }
        let &[source] = transpose.inputs() else {
            return None;
        };

        Some(FusibleOperand {
            transpose: transpose_id,
            transposed,
            source,
        })
    }

    fn fuse(&self, graph: &mut Graph, id: OpId, slot: usize, operand: &FusibleOperand) -> bool {
        let Some(op) = graph.operator_mut(id) else {
            return false;
        };
        if !op.def_mut().toggle_operand_transpose(slot) {
            return false;
        }
        op.set_input(slot, operand.source);

        if let Some(source) = graph.tensor_mut(operand.source) {
            source.remove_target(operand.transpose);
            source.add_target(id);
        }
        graph.remove_tensor(operand.transposed);

        graph.refresh_edges(id);
        if let Some(producer) = graph.tensor(operand.source).and_then(|t| t.source()) {
            graph.refresh_edges(producer);
        }
        true
    }
}

impl RewriteRule for TransposeMatMulFusion {
    fn name(&self) -> &'static str {
        "transpose-matmul-fusion"
    }

    fn apply(&self, graph: &mut Graph, id: OpId, pending: &mut PendingRemovals) -> bool {
        match graph.operator(id) {
            Some(op) if op.op_type() == OpType::MatMul => {}
            _ => return false,
        }
        if pending.is_touched(id) {
            return false;
        }

        let mut changed = false;
        for slot in 0..2 {
            let Some(operand) = self.match_operand(graph, id, slot, pending) else {
                continue;
            };
            if !self.fuse(graph, id, slot, &operand) {
                continue;
            }

            pending.schedule(operand.transpose);
            pending.touch(id);
            pending.record_tensors(1);
            changed = true;
            log::debug!(
                "fused {} into operand {} of {}",
                operand.transpose,
                slot,
                id
            );
        }
        changed
    }
}

impl Graph {
    /// Run the optimizer configured for this graph.
    ///
    /// Validates the result afterwards unless disabled in
    /// [`OptimizerConfig::validate_after_rewrite`].
    pub fn optimize(&mut self) -> Result<OptimizeResult, GraphError> {
        let optimizer = Optimizer::from_config(&self.config.optimizer);
        let result = optimizer.run(self)?;

        if self.config.optimizer.validate_after_rewrite {
            self.check_valid()?;
        }

        log::info!(
            "optimize: {} operators and {} tensors eliminated",
            result.operators_eliminated,
            result.tensors_eliminated
        );
        Ok(result)
    }
}
