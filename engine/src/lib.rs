//! Tensor graph engine.
//!
//! Build a [`Graph`] of tensors and operators, then compile it:
//!
//! ```no_run
//! use std::rc::Rc;
//! use tensorplan::{DataType, Graph};
//! use tensorplan_runtime::CpuRuntime;
//!
//! let mut graph = Graph::new(Rc::new(CpuRuntime::new()));
//! let a = graph.add_tensor(vec![4, 3], DataType::Float32);
//! let b = graph.add_tensor(vec![4, 5], DataType::Float32);
//! let at = graph.transpose(a, vec![1, 0])?;
//! graph.matmul(at, b, false, false)?;
//!
//! graph.optimize()?;
//! graph.shape_infer()?;
//! graph.data_malloc()?;
//! # Ok::<(), tensorplan::GraphError>(())
//! ```

pub mod allocator;
pub mod config;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod ids;
pub mod logging;
pub mod ops;
pub mod shape;
pub mod tensor;

pub use allocator::{Allocator, AllocatorPhase, AllocatorStats};
pub use config::{parse_config, AllocatorConfig, ConfigError, EngineConfig, OptimizerConfig};
pub use dtype::DataType;
pub use error::{AllocError, GraphError, ShapeError, ValidationError, ValidationErrorKind};
pub use graph::{Graph, GraphSnapshot, OptimizeResult, Optimizer, RewriteRule};
pub use ids::{Fuid, Guid, IdGenerator, OpId, TensorId};
pub use ops::{OpDef, OpType, Operator};
pub use tensor::{DataBlob, Shape, Tensor};
