use parfor::{parallel_for, ParallelFor, ParallelForError};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn visited(workers: usize, grain: usize, n: usize) -> Vec<usize> {
    let counts: Vec<AtomicUsize> = (0..n).map(|_| AtomicUsize::new(0)).collect();
    ParallelFor::with_workers(Some(workers))
        .grain(grain)
        .run(n, |i| {
            counts[i].fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    counts.into_iter().map(AtomicUsize::into_inner).collect()
}

#[test]
fn test_every_index_visited_exactly_once() {
    for n in [0, 1, 2, 9, 10, 64, 1_000, 4_097] {
        for grain in [1, 3, 7, 64] {
            for workers in [1, 2, 5, 16] {
                let counts = visited(workers, grain, n);
                assert!(
                    counts.iter().all(|&c| c == 1),
                    "n={n} grain={grain} workers={workers}: {counts:?}"
                );
            }
        }
    }
}

#[test]
fn test_grain_does_not_change_visited_set() {
    let n = 1_000;
    let collect = |grain: usize| {
        let seen = Mutex::new(BTreeSet::new());
        ParallelFor::with_workers(Some(4))
            .grain(grain)
            .run(n, |i| {
                assert!(seen.lock().unwrap().insert(i), "index {i} visited twice");
            })
            .unwrap();
        seen.into_inner().unwrap()
    };

    let expected: BTreeSet<usize> = (0..n).collect();
    for grain in [1, 7, n, n + 1, usize::MAX] {
        assert_eq!(collect(grain), expected, "grain={grain}");
    }
}

#[test]
fn test_single_chunk_when_grain_covers_range() {
    let n = 50;
    let stats = ParallelFor::with_workers(Some(8))
        .grain(n)
        .run(n, |_| {})
        .unwrap();

    assert_eq!(stats.chunks, 1);
    assert!(visited(8, n + 1, n).iter().all(|&c| c == 1));
}

#[test]
fn test_worker_count_does_not_change_coverage() {
    let n = 10_007;
    assert_eq!(visited(1, 11, n), visited(64, 11, n));
}

#[test]
fn test_concurrent_counter_is_exact() {
    for _ in 0..20 {
        let counter = AtomicUsize::new(0);
        parallel_for(100_000, 37, |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        assert_eq!(counter.into_inner(), 100_000);
    }
}

#[test]
fn test_boundary_chunks() {
    let starts = Mutex::new(Vec::new());
    let stats = ParallelFor::with_workers(Some(3))
        .grain(3)
        .run(10, |i| {
            if i % 3 == 0 {
                starts.lock().unwrap().push(i);
            }
        })
        .unwrap();

    let mut starts = starts.into_inner().unwrap();
    starts.sort_unstable();
    assert_eq!(starts, vec![0, 3, 6, 9]);
    assert_eq!(stats.chunks, 4);
}

#[test]
fn test_zero_grain_is_rejected() {
    assert_eq!(parallel_for(10, 0, |_| {}), Err(ParallelForError::InvalidGrain));
}
