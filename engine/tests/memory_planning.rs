mod common;

use common::{f32_tensor, recording_graph};
use tensorplan::ops::Unary;
use tensorplan::{AllocError, DataType, GraphError};

#[test]
fn test_every_tensor_bound_inside_one_buffer() {
    let (mut g, runtime) = recording_graph();
    let a = f32_tensor(&mut g, &[4, 3]);
    let b = f32_tensor(&mut g, &[4, 5]);
    let at = g.transpose(a, vec![1, 0]).unwrap();
    let c = g.matmul(at, b, false, false).unwrap();
    g.add_op_with_outputs(Unary::relu(), &[c]).unwrap();

    let stats = g.data_malloc().unwrap();

    let total: usize = g.tensors().map(|t| t.bytes()).sum();
    assert_eq!(total, (12 + 20 + 12 + 15 + 15) * 4);
    assert_eq!(stats.peak, total);
    assert_eq!(runtime.sizes(), vec![total]);

    let base = g.allocator().buffer().unwrap().as_ptr() as usize;
    let mut expected_offset = 0;
    for tensor in g.tensors() {
        let blob = tensor.data().unwrap();
        assert_eq!(blob.offset(), expected_offset);
        assert_eq!(blob.len(), tensor.bytes());
        assert_eq!(blob.as_ptr() as usize, base + expected_offset);
        expected_offset += tensor.bytes();
    }
    assert!(expected_offset <= g.allocator().peak());
}

#[test]
fn test_mixed_dtypes_pack_back_to_back() {
    let (mut g, _) = recording_graph();
    let x = g.add_tensor(vec![3], DataType::UInt8);
    let (_, y) = g.add_op_with_outputs(Unary::relu(), &[x]).unwrap();

    let stats = g.data_malloc().unwrap();
    // 6 bytes rounded up to one 8-byte unit.
    assert_eq!(stats.peak, 8);
    assert_eq!(g.tensor(y[0]).unwrap().data().unwrap().offset(), 3);
}

#[test]
fn test_buffer_requested_once_and_released_with_graph() {
    let (mut g, runtime) = recording_graph();
    let x = f32_tensor(&mut g, &[16]);
    g.add_op_with_outputs(Unary::relu(), &[x]).unwrap();

    g.data_malloc().unwrap();
    assert_eq!(
        g.data_malloc(),
        Err(GraphError::Alloc(AllocError::Materialized { operation: "alloc" }))
    );
    assert_eq!(runtime.allocs(), 1);
    assert_eq!(runtime.deallocs(), 0);

    drop(g);
    assert_eq!(runtime.deallocs(), 1);
}

#[test]
fn test_planning_after_optimize() {
    let (mut g, runtime) = recording_graph();
    let x = f32_tensor(&mut g, &[8, 2]);
    let mid = g.transpose(x, vec![1, 0]).unwrap();
    let y = g.transpose(mid, vec![1, 0]).unwrap();
    g.add_op_with_outputs(Unary::relu(), &[y]).unwrap();

    g.optimize().unwrap();
    g.shape_infer().unwrap();
    g.data_malloc().unwrap();

    assert_eq!(g.num_tensors(), 2);
    assert_eq!(runtime.sizes(), vec![2 * 16 * 4]);
}

#[test]
fn test_unplanned_graph_never_touches_runtime() {
    let (mut g, runtime) = recording_graph();
    let x = f32_tensor(&mut g, &[2]);
    g.add_op_with_outputs(Unary::relu(), &[x]).unwrap();
    drop(g);
    assert_eq!(runtime.allocs(), 0);
    assert_eq!(runtime.deallocs(), 0);
}

#[test]
fn test_oversized_shape_is_out_of_memory() {
    let (mut g, runtime) = recording_graph();
    let x = g.add_tensor(vec![usize::MAX / 2, 3], DataType::Float32);
    g.add_op_with_outputs(Unary::relu(), &[x]).unwrap();

    assert!(matches!(
        g.data_malloc(),
        Err(GraphError::Alloc(AllocError::OutOfMemory { .. }))
    ));
    assert_eq!(runtime.allocs(), 0);
    assert!(g.tensors().all(|t| t.data().is_none()));
}

#[test]
fn test_total_overflow_is_out_of_memory() {
    let (mut g, runtime) = recording_graph();
    // Each tensor fits in usize on its own, the pair does not.
    let x = f32_tensor(&mut g, &[usize::MAX / 8 + 1]);
    g.add_op_with_outputs(Unary::relu(), &[x]).unwrap();

    assert!(matches!(
        g.data_malloc(),
        Err(GraphError::Alloc(AllocError::OutOfMemory { .. }))
    ));
    assert_eq!(runtime.allocs(), 0);
}
