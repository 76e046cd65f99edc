//! Computation graph.
//!
//! The graph owns every tensor and operator in insertion-ordered tables keyed
//! by id. Links between them (tensor source/targets, operator
//! predecessors/successors) are plain ids resolved through those tables, so no
//! link ever keeps an entity alive.
//!
//! Compilation runs in this order:
//!
//! 1. [`Graph::optimize`] - peephole rewrites (see [`optimize`])
//! 2. [`Graph::shape_infer`] - recompute output shapes in topological order
//! 3. [`Graph::data_malloc`] - plan tensor storage and bind it to one buffer

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use std::rc::Rc;

use tensorplan_runtime::Runtime;

use crate::allocator::Allocator;
use crate::config::{ConfigError, EngineConfig};
use crate::dtype::DataType;
use crate::error::GraphError;
use crate::ids::{Fuid, IdGenerator, OpId, TensorId};
use crate::ops::{MatMul, OpDef, Operator, TensorList, Transpose};
use crate::tensor::{Shape, Tensor};

pub mod dump;
pub mod memory;
pub mod optimize;
pub mod shape_infer;
pub mod topo;
pub mod validation;

pub use dump::GraphSnapshot;
pub use optimize::{OptimizeResult, Optimizer, RewriteRule};

#[derive(Debug)]
pub struct Graph {
    runtime: Rc<dyn Runtime>,
    ids: Rc<IdGenerator>,
    config: EngineConfig,
    tensors: IndexMap<TensorId, Tensor>,
    operators: IndexMap<OpId, Operator>,
    allocator: Allocator,

    /// Operator table is in topological order and nothing changed since
    sorted: bool,
}

impl Graph {
    pub fn new(runtime: Rc<dyn Runtime>) -> Self {
        let config = EngineConfig::default();
        let allocator = Allocator::from_valid_config(runtime.clone(), &config.allocator);
        Self::assemble(runtime, config, Rc::new(IdGenerator::new()), allocator)
    }

    pub fn with_config(runtime: Rc<dyn Runtime>, config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::with_ids(runtime, config, Rc::new(IdGenerator::new()))
    }

    /// Build a graph that mints ids from `ids`.
    ///
    /// Fails if the allocator section of `config` is invalid.
    pub fn with_ids(
        runtime: Rc<dyn Runtime>,
        config: &EngineConfig,
        ids: Rc<IdGenerator>,
    ) -> Result<Self, ConfigError> {
        let allocator = Allocator::with_config(runtime.clone(), &config.allocator)?;
        Ok(Self::assemble(runtime, config.clone(), ids, allocator))
    }

    fn assemble(
        runtime: Rc<dyn Runtime>,
        config: EngineConfig,
        ids: Rc<IdGenerator>,
        allocator: Allocator,
    ) -> Self {
        Self {
            runtime,
            ids,
            config,
            tensors: IndexMap::new(),
            operators: IndexMap::new(),
            allocator,
            sorted: false,
        }
    }

    pub fn runtime(&self) -> &Rc<dyn Runtime> {
        &self.runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    // ------------------------------------------------------------------
    // Tensors
    // ------------------------------------------------------------------

    pub fn add_tensor(&mut self, shape: impl Into<Shape>, dtype: DataType) -> TensorId {
        let id = self.ids.next_tensor_id();
        let fuid = self.ids.next_fuid();
        self.tensors.insert(id, Tensor::new(id, fuid, shape.into(), dtype));
        self.sorted = false;
        id
    }

    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    /// Look a tensor up by its logical id.
    pub fn get_tensor(&self, fuid: Fuid) -> Option<&Tensor> {
        self.tensors.values().find(|t| t.fuid() == fuid)
    }

    /// All tensors in insertion order.
    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> + '_ {
        self.tensors.values()
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    pub fn contains_tensor(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    /// Overwrite a tensor's shape, typically a graph input before re-running
    /// [`Graph::shape_infer`].
    pub fn set_tensor_shape(&mut self, id: TensorId, shape: impl Into<Shape>) -> Result<(), GraphError> {
        self.tensors
            .get_mut(&id)
            .ok_or(GraphError::UnknownTensor(id))?
            .set_shape(shape.into());
        Ok(())
    }

    pub fn remove_tensor(&mut self, id: TensorId) -> Option<Tensor> {
        self.sorted = false;
        self.tensors.shift_remove(&id)
    }

    pub(crate) fn tensor_mut(&mut self, id: TensorId) -> Option<&mut Tensor> {
        self.tensors.get_mut(&id)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub fn operator(&self, id: OpId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    /// All operators; topological order once sorted.
    pub fn operators(&self) -> impl Iterator<Item = &Operator> + '_ {
        self.operators.values()
    }

    pub fn op_ids(&self) -> Vec<OpId> {
        self.operators.keys().copied().collect()
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn contains_operator(&self, id: OpId) -> bool {
        self.operators.contains_key(&id)
    }

    pub fn remove_operator(&mut self, id: OpId) -> Option<Operator> {
        self.sorted = false;
        self.operators.shift_remove(&id)
    }

    pub(crate) fn operator_mut(&mut self, id: OpId) -> Option<&mut Operator> {
        self.operators.get_mut(&id)
    }

    /// Attach an operator over existing tensors.
    pub fn add_operator(
        &mut self,
        def: impl OpDef + 'static,
        inputs: &[TensorId],
        outputs: &[TensorId],
    ) -> Result<OpId, GraphError> {
        self.check_arity(&def, inputs.len(), outputs.len())?;
        for &t in inputs.iter().chain(outputs) {
            if !self.tensors.contains_key(&t) {
                return Err(GraphError::UnknownTensor(t));
            }
        }
        for &t in outputs {
            if let Some(producer) = self.tensors[&t].source() {
                return Err(GraphError::AlreadyProduced { tensor: t, producer });
            }
        }

        let op = Operator::new(
            self.ids.next_op_id(),
            Box::new(def),
            SmallVec::from_slice(inputs),
            SmallVec::from_slice(outputs),
        );
        Ok(self.add_operator_and_connect(op))
    }

    /// Attach an operator, creating its outputs from inferred shapes.
    ///
    /// Outputs take the element type of the first input.
    pub fn add_op_with_outputs(
        &mut self,
        def: impl OpDef + 'static,
        inputs: &[TensorId],
    ) -> Result<(OpId, Vec<TensorId>), GraphError> {
        self.check_arity(&def, inputs.len(), def.num_outputs())?;

        let mut shapes = Vec::with_capacity(inputs.len());
        for &t in inputs {
            shapes.push(self.tensors.get(&t).ok_or(GraphError::UnknownTensor(t))?.shape());
        }
        let dtype = inputs
            .first()
            .map(|t| self.tensors[t].dtype())
            .unwrap_or(DataType::Float32);

        let id = self.ids.next_op_id();
        let out_shapes = def
            .infer_shape(&shapes)
            .map_err(|source| GraphError::Shape { op: id, source })?;
        if out_shapes.len() != def.num_outputs() {
            return Err(GraphError::OutputCount {
                op: id,
                expected: def.num_outputs(),
                found: out_shapes.len(),
            });
        }

        let outputs: TensorList = out_shapes
            .into_iter()
            .map(|shape| self.add_tensor(shape, dtype))
            .collect();
        let op = Operator::new(id, Box::new(def), SmallVec::from_slice(inputs), outputs.clone());
        self.add_operator_and_connect(op);
        Ok((id, outputs.into_vec()))
    }

    fn check_arity(&self, def: &dyn OpDef, inputs: usize, outputs: usize) -> Result<(), GraphError> {
        let expected = (def.num_inputs(), def.num_outputs());
        if expected != (inputs, outputs) {
            return Err(GraphError::Arity {
                op_type: def.op_type(),
                expected,
                found: (inputs, outputs),
            });
        }
        Ok(())
    }

    /// `a x b` with optional operand transposition. Returns the output tensor.
    pub fn matmul(
        &mut self,
        a: TensorId,
        b: TensorId,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<TensorId, GraphError> {
        let (_, outputs) = self.add_op_with_outputs(MatMul::new(trans_a, trans_b), &[a, b])?;
        Ok(outputs[0])
    }

    /// Permute the axes of `input`. Returns the output tensor.
    pub fn transpose(&mut self, input: TensorId, permutation: Vec<usize>) -> Result<TensorId, GraphError> {
        let (_, outputs) = self.add_op_with_outputs(Transpose::new(permutation), &[input])?;
        Ok(outputs[0])
    }

    /// Insert `op` and wire every edge implied by its tensors.
    ///
    /// Inputs gain `op` as a target and their producers become predecessors;
    /// outputs get `op` as source and their existing consumers become
    /// successors. Links are recorded on both ends.
    pub(crate) fn add_operator_and_connect(&mut self, mut op: Operator) -> OpId {
        let id = op.id();
        self.sorted = false;

        let inputs = op.inputs().to_vec();
        for input in inputs {
            let Some(tensor) = self.tensors.get_mut(&input) else {
                continue;
            };
            tensor.add_target(id);
            if let Some(pred) = tensor.source() {
                if let Some(pred_op) = self.operators.get_mut(&pred) {
                    pred_op.add_successor(id);
                }
                op.add_predecessor(pred);
            }
        }

        let outputs = op.outputs().to_vec();
        for output in outputs {
            let Some(tensor) = self.tensors.get_mut(&output) else {
                continue;
            };
            tensor.set_source(Some(id));
            for &succ in tensor.targets() {
                if let Some(succ_op) = self.operators.get_mut(&succ) {
                    succ_op.add_predecessor(id);
                }
                op.add_successor(succ);
            }
        }

        log::trace!("connected {} {}", id, op);
        self.operators.insert(id, op);
        id
    }

    /// Re-derive `id`'s predecessor and successor sets from tensor edges.
    pub(crate) fn refresh_edges(&mut self, id: OpId) {
        let Some(op) = self.operators.get(&id) else {
            return;
        };

        let predecessors: IndexSet<OpId> = op
            .inputs()
            .iter()
            .filter_map(|t| self.tensors.get(t)?.source())
            .collect();
        let successors: IndexSet<OpId> = op
            .outputs()
            .iter()
            .filter_map(|t| self.tensors.get(t))
            .flat_map(|t| t.targets().iter().copied())
            .collect();

        if let Some(op) = self.operators.get_mut(&id) {
            op.set_predecessors(predecessors);
            op.set_successors(successors);
        }
    }
}
