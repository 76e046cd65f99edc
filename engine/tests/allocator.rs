mod common;

use std::rc::Rc;

use common::{Lcg, RecordingRuntime};
use tensorplan::{AllocError, Allocator, AllocatorConfig};

fn allocator() -> (Allocator, Rc<RecordingRuntime>) {
    let runtime = RecordingRuntime::new();
    (Allocator::new(runtime.clone()), runtime)
}

fn assert_no_adjacent_free_blocks(a: &Allocator) {
    let blocks: Vec<_> = a.free_blocks().collect();
    for pair in blocks.windows(2) {
        let (start, len) = pair[0];
        assert!(
            start + len < pair[1].0,
            "free blocks {:?} and {:?} touch",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_first_fit_reuses_low_block() {
    let (mut a, _) = allocator();
    assert_eq!(a.alloc(8).unwrap(), 0);
    assert_eq!(a.alloc(16).unwrap(), 8);
    a.free(0, 8).unwrap();
    assert_eq!(a.alloc(8).unwrap(), 0);
    assert_eq!(a.used(), 24);
    assert_eq!(a.peak(), 24);
}

#[test]
fn test_accounting_under_random_interleaving() {
    let (mut a, _) = allocator();
    let mut rng = Lcg::new(0x5eed);
    let mut live: Vec<(usize, usize)> = Vec::new();
    let mut max_used = 0;
    let mut last_peak = 0;

    for _ in 0..2_000 {
        if live.is_empty() || rng.below(3) != 0 {
            let size = rng.below(256);
            let addr = a.alloc(size).unwrap();
            live.push((addr, size));
        } else {
            let (addr, size) = live.swap_remove(rng.below(live.len()));
            a.free(addr, size).unwrap();
        }

        let expected: usize = live
            .iter()
            .map(|&(_, size)| a.aligned_size(size).unwrap())
            .sum();
        assert_eq!(a.used(), expected);

        max_used = max_used.max(a.used());
        assert!(a.peak() >= last_peak);
        assert_eq!(a.peak(), max_used);
        last_peak = a.peak();

        assert_no_adjacent_free_blocks(&a);
    }
}

#[test]
fn test_live_ranges_never_overlap() {
    let (mut a, _) = allocator();
    let mut rng = Lcg::new(42);
    let mut live: Vec<(usize, usize)> = Vec::new();

    for _ in 0..500 {
        if live.len() < 4 || rng.below(2) == 0 {
            let size = rng.below(100) + 1;
            let addr = a.alloc(size).unwrap();
            let end = addr + a.aligned_size(size).unwrap();
            for &(other, other_size) in &live {
                let other_end = other + a.aligned_size(other_size).unwrap();
                assert!(end <= other || other_end <= addr);
            }
            live.push((addr, size));
        } else {
            let (addr, size) = live.remove(rng.below(live.len()));
            a.free(addr, size).unwrap();
        }
    }
}

#[test]
fn test_full_reclamation_in_any_order() {
    for order in [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
        let (mut a, _) = allocator();
        let sizes = [8, 24, 5, 64];
        let addrs: Vec<usize> = sizes.iter().map(|&s| a.alloc(s).unwrap()).collect();

        for &i in &order {
            a.free(addrs[i], sizes[i]).unwrap();
            assert_no_adjacent_free_blocks(&a);
        }

        assert_eq!(a.used(), 0);
        assert_eq!(a.free_blocks().collect::<Vec<_>>(), vec![(0, a.capacity())]);
    }
}

#[test]
fn test_out_of_memory_is_recoverable() {
    let runtime = RecordingRuntime::new();
    let config = AllocatorConfig {
        alignment: 8,
        capacity: 32,
    };
    let mut a = Allocator::with_config(runtime, &config).unwrap();

    let first = a.alloc(24).unwrap();
    assert_eq!(
        a.alloc(16),
        Err(AllocError::OutOfMemory {
            requested: 16,
            largest_free: 8
        })
    );
    // State untouched by the failed request.
    assert_eq!(a.used(), 24);

    a.free(first, 24).unwrap();
    assert_eq!(a.alloc(32).unwrap(), 0);
}

#[test]
fn test_materialize_once_and_release_on_drop() {
    let (mut a, runtime) = allocator();
    let x = a.alloc(100).unwrap();
    a.alloc(20).unwrap();
    a.free(x, 100).unwrap();

    let first = a.get_ptr().unwrap();
    let second = a.get_ptr().unwrap();
    assert_eq!(first, second);
    assert_eq!(runtime.sizes(), vec![128]);

    assert_eq!(
        a.alloc(8),
        Err(AllocError::Materialized { operation: "alloc" })
    );
    assert_eq!(
        a.free(104, 24),
        Err(AllocError::Materialized { operation: "free" })
    );

    drop(a);
    assert_eq!(runtime.allocs(), 1);
    assert_eq!(runtime.deallocs(), 1);
}

#[test]
fn test_custom_alignment() {
    let runtime = RecordingRuntime::new();
    let config = AllocatorConfig {
        alignment: 64,
        ..AllocatorConfig::default()
    };
    let mut a = Allocator::with_config(runtime, &config).unwrap();
    assert_eq!(a.alloc(1).unwrap(), 0);
    assert_eq!(a.alloc(65).unwrap(), 64);
    assert_eq!(a.used(), 192);
}
