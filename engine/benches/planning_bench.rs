use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::rc::Rc;

use tensorplan::ops::Unary;
use tensorplan::{logging, Allocator, DataType, Graph};
use tensorplan_runtime::CpuRuntime;

fn bench_allocator_churn(c: &mut Criterion) {
    c.bench_function("allocator_churn_1k", |b| {
        b.iter(|| {
            let mut allocator = Allocator::new(Rc::new(CpuRuntime::new()));
            let mut live = Vec::with_capacity(64);
            for i in 0..1_000usize {
                let size = (i * 37) % 512;
                live.push((allocator.alloc(size).unwrap(), size));
                if live.len() == 64 {
                    // Free every other block so the free map fragments.
                    for (addr, size) in live.drain(..).step_by(2) {
                        allocator.free(addr, size).unwrap();
                    }
                }
            }
            black_box(allocator.peak())
        })
    });
}

/// A chain of `len` unary operators, inserted back to front.
fn reversed_chain(len: usize) -> Graph {
    let mut graph = Graph::new(Rc::new(CpuRuntime::new()));
    let tensors: Vec<_> = (0..=len)
        .map(|_| graph.add_tensor(vec![64, 64], DataType::Float32))
        .collect();
    for i in (0..len).rev() {
        graph
            .add_operator(Unary::relu(), &[tensors[i]], &[tensors[i + 1]])
            .unwrap();
    }
    graph
}

fn bench_topo_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("topo_sort_reversed_chain");
    for len in [16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter_batched(
                || reversed_chain(len),
                |mut graph| black_box(graph.topo_sort()),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    logging::init_from_env();
    c.bench_function("optimize_infer_plan_chain_64", |b| {
        b.iter_batched(
            || reversed_chain(64),
            |mut graph| {
                graph.optimize().unwrap();
                graph.shape_infer().unwrap();
                black_box(graph.data_malloc().unwrap())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_allocator_churn, bench_topo_sort, bench_compile);
criterion_main!(benches);
