//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tensorplan::{logging, DataType, EngineConfig, Graph, IdGenerator};
use tensorplan_runtime::{BufferHandle, CpuRuntime, Runtime, RuntimeError};

/// Host runtime that records every provider call.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    inner: CpuRuntime,
    allocs: Cell<usize>,
    deallocs: Cell<usize>,
    sizes: RefCell<Vec<usize>>,
}

impl RecordingRuntime {
    /// Also installs the test logger, so every integration test gets one.
    pub fn new() -> Rc<Self> {
        logging::init_test();
        Rc::new(Self::default())
    }

    pub fn allocs(&self) -> usize {
        self.allocs.get()
    }

    pub fn deallocs(&self) -> usize {
        self.deallocs.get()
    }

    /// Requested sizes, in call order.
    pub fn sizes(&self) -> Vec<usize> {
        self.sizes.borrow().clone()
    }
}

impl Runtime for RecordingRuntime {
    fn name(&self) -> &str {
        "recording"
    }

    fn alloc(&self, size: usize) -> Result<BufferHandle, RuntimeError> {
        self.allocs.set(self.allocs.get() + 1);
        self.sizes.borrow_mut().push(size);
        self.inner.alloc(size)
    }

    fn dealloc(&self, handle: BufferHandle) {
        self.deallocs.set(self.deallocs.get() + 1);
        self.inner.dealloc(handle);
    }
}

/// Graph over a recording runtime with ids starting at 1.
pub fn recording_graph() -> (Graph, Rc<RecordingRuntime>) {
    let runtime = RecordingRuntime::new();
    let graph = Graph::with_ids(
        runtime.clone(),
        &EngineConfig::default(),
        Rc::new(IdGenerator::new()),
    )
    .unwrap();
    (graph, runtime)
}

pub fn f32_tensor(graph: &mut Graph, shape: &[usize]) -> tensorplan::TensorId {
    graph.add_tensor(shape.to_vec(), DataType::Float32)
}

/// Deterministic pseudo-random sequence for property-style tests.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
