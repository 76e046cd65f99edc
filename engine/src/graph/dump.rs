//! Human-readable and JSON dumps of a graph.

use serde::Serialize;
use std::fmt;

use super::Graph;
use crate::dtype::DataType;
use crate::ids::{Fuid, Guid};
use crate::ops::OpType;

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Tensors:")?;
        for tensor in self.tensors.values() {
            writeln!(f, "{}", tensor)?;
        }

        writeln!(f, "Graph operators:")?;
        for op in self.operators.values() {
            let preds: Vec<u64> = op.predecessors().iter().map(|p| p.guid().as_u64()).collect();
            let succs: Vec<u64> = op.successors().iter().map(|s| s.guid().as_u64()).collect();
            writeln!(
                f,
                "OP {}, pred {:?}, succ {:?}, {}",
                op.guid(),
                preds,
                succs,
                op
            )?;
        }
        Ok(())
    }
}

/// Serializable view of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub sorted: bool,
    pub tensors: Vec<TensorSnapshot>,
    pub operators: Vec<OperatorSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TensorSnapshot {
    pub guid: Guid,
    pub fuid: Fuid,
    pub shape: Vec<usize>,
    pub dtype: DataType,
    pub source: Option<Guid>,
    pub targets: Vec<Guid>,
    /// Byte offset into the planned buffer, once bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorSnapshot {
    pub guid: Guid,
    pub op_type: OpType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attributes: String,
    pub inputs: Vec<Guid>,
    pub outputs: Vec<Guid>,
    pub predecessors: Vec<Guid>,
    pub successors: Vec<Guid>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Graph {
    pub fn snapshot(&self) -> GraphSnapshot {
        let tensors = self
            .tensors
            .values()
            .map(|t| TensorSnapshot {
                guid: t.guid(),
                fuid: t.fuid(),
                shape: t.shape().to_vec(),
                dtype: t.dtype(),
                source: t.source().map(|op| op.guid()),
                targets: t.targets().iter().map(|op| op.guid()).collect(),
                offset: t.data().map(|blob| blob.offset()),
            })
            .collect();

        let operators = self
            .operators
            .values()
            .map(|op| OperatorSnapshot {
                guid: op.guid(),
                op_type: op.op_type(),
                attributes: op.def().attributes(),
                inputs: op.inputs().iter().map(|t| t.guid()).collect(),
                outputs: op.outputs().iter().map(|t| t.guid()).collect(),
                predecessors: op.predecessors().iter().map(|p| p.guid()).collect(),
                successors: op.successors().iter().map(|s| s.guid()).collect(),
            })
            .collect();

        GraphSnapshot {
            sorted: self.sorted,
            tensors,
            operators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::MatMul;
    use std::rc::Rc;
    use tensorplan_runtime::CpuRuntime;

    fn small_graph() -> Graph {
        let mut g = Graph::new(Rc::new(CpuRuntime::new()));
        let a = g.add_tensor(vec![4, 3], DataType::Float32);
        let b = g.add_tensor(vec![4, 5], DataType::Float32);
        g.add_op_with_outputs(MatMul::new(true, false), &[a, b]).unwrap();
        g
    }

    #[test]
    fn test_display_sections() {
        let dump = small_graph().to_string();
        assert!(dump.starts_with("Graph Tensors:\n"));
        assert!(dump.contains("Graph operators:\n"));
        assert!(dump.contains("OP 3, pred [], succ [], MatMul[A^T,B](inputs=[1, 2], outputs=[4])"));
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = small_graph().snapshot();
        assert_eq!(snapshot.tensors.len(), 3);
        assert_eq!(snapshot.operators[0].op_type, OpType::MatMul);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["operators"][0]["op_type"], "MatMul");
        assert_eq!(json["operators"][0]["attributes"], "A^T,B");
        assert_eq!(json["tensors"][2]["shape"], serde_json::json!([3, 5]));
        assert_eq!(json["tensors"][2]["source"], 3);
        assert!(json["tensors"][0].get("offset").is_none());
    }
}
