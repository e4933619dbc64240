//! Stress tests for concurrent tree operations.
//!
//! These tests try to expose races through:
//! - many threads inserting disjoint key sets (split and root-growth races)
//! - monotonic keys (every thread hammers the rightmost leaves)
//! - range scans racing with inserts (conversion under contention)
//! - mixed point reads, updates and removes
//!
//! ```bash
//! cargo test --release --test stress_tests
//! RUST_LOG=blinkhash=debug cargo test --release --features tracing --test stress_tests
//! ```

#![allow(clippy::pedantic)]
#![expect(clippy::unwrap_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use blinkhash::{BlinkHash, LeafMode, MedianPolicy, SortedConfig, TreeConfig};

/// Small nodes: frequent splits, deep trees.
struct Small;

impl TreeConfig for Small {
    const INNER_WIDTH: usize = 8;
    const SORTED_WIDTH: usize = 8;
    const HASH_BUCKETS: usize = 8;
    const MEDIAN: MedianPolicy = MedianPolicy::Sampled(32);
}

/// Small sorted-only nodes.
struct SmallSorted;

impl TreeConfig for SmallSorted {
    const INNER_WIDTH: usize = 6;
    const SORTED_WIDTH: usize = 6;
    const HASH_BUCKETS: usize = 8;
    const LEAF_MODE: LeafMode = LeafMode::Sorted;
}

/// Every key of `0..count` must be present with value `key + 1`.
fn verify_all<C: TreeConfig>(tree: &BlinkHash<u64, C>, count: u64, test_name: &str) {
    let guard = tree.guard();
    let missing: Vec<u64> = (0..count)
        .filter(|k| tree.lookup_with_guard(k, &guard) != Some(k + 1))
        .collect();

    if !missing.is_empty() {
        let sample: Vec<_> = missing.iter().take(20).collect();
        panic!(
            "{test_name}: {} keys missing or wrong (first 20): {sample:?}\n\
             tree.len()={}, expected={count}",
            missing.len(),
            tree.len(),
        );
    }

    assert_eq!(tree.len() as u64, count, "{test_name}: count");
    let stats = tree.check_invariants().unwrap();
    assert_eq!(stats.entries as u64, count, "{test_name}: leaf entries");
}

/// Insert `i * threads + t` for `i < per_thread` from every thread.
fn interleaved_insert<C: TreeConfig>(tree: &Arc<BlinkHash<u64, C>>, threads: u64, per_thread: u64) {
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(tree);
            thread::spawn(move || {
                let guard = tree.guard();
                for i in 0..per_thread {
                    let k = i * threads + t;
                    assert_eq!(tree.insert_with_guard(k, k + 1, &guard), None);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

// =============================================================================
//  Inserts
// =============================================================================

#[test]
fn monotonic_8_threads_100k_each() {
    common::init_tracing();

    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 100_000;

    let tree: Arc<BlinkHash<u64>> = Arc::new(BlinkHash::new());
    interleaved_insert(&tree, THREADS, PER_THREAD);

    verify_all(&tree, THREADS * PER_THREAD, "monotonic_8_threads");
    let counters = tree.counters();
    assert!(counters.leaf_splits > 0);
    assert!(counters.root_growths >= 1);
}

#[test]
fn small_nodes_16_threads() {
    common::init_tracing();

    let tree: Arc<BlinkHash<u64, Small>> = Arc::new(BlinkHash::new());
    interleaved_insert(&tree, 16, 5_000);

    verify_all(&tree, 80_000, "small_nodes_16_threads");
    assert!(tree.height() >= 4);
}

#[test]
fn sorted_only_8_threads() {
    common::init_tracing();

    let tree: Arc<BlinkHash<u64, SmallSorted>> = Arc::new(BlinkHash::new());
    interleaved_insert(&tree, 8, 5_000);

    verify_all(&tree, 40_000, "sorted_only_8_threads");
    assert_eq!(tree.stats().hash_leaves, 0);
}

#[test]
fn pseudorandom_keys_8_threads() {
    common::init_tracing();

    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 10_000;
    let mix = |k: u64| k.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);

    let tree: Arc<BlinkHash<u64, Small>> = Arc::new(BlinkHash::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let guard = tree.guard();
                for i in 0..PER_THREAD {
                    let k = mix(t * PER_THREAD + i);
                    tree.insert_with_guard(k, k, &guard);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let guard = tree.guard();
    for n in 0..THREADS * PER_THREAD {
        let k = mix(n);
        assert_eq!(tree.lookup_with_guard(&k, &guard), Some(k), "key {k}");
    }
    tree.check_invariants().unwrap();
}

// =============================================================================
//  Scans racing with inserts
// =============================================================================

#[test]
fn scans_during_inserts() {
    common::init_tracing();

    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 20_000;

    let tree: Arc<BlinkHash<u64, Small>> = Arc::new(BlinkHash::new());
    let done = Arc::new(AtomicBool::new(false));
    let scans = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..2u64)
        .map(|r| {
            let tree = Arc::clone(&tree);
            let done = Arc::clone(&done);
            let scans = Arc::clone(&scans);
            thread::spawn(move || {
                let guard = tree.guard();
                let mut out = Vec::new();
                let mut min = r * 1_000;
                while !done.load(Ordering::Acquire) {
                    let n = tree.range_lookup_with_guard(&min, 64, &mut out, &guard);
                    assert_eq!(n, out.len());
                    assert!(out.windows(2).all(|w| w[0].0 < w[1].0), "scan not ascending");
                    assert!(out.iter().all(|&(k, v)| k >= min && v == k + 1));
                    scans.fetch_add(1, Ordering::Relaxed);
                    min = (min + 997) % (WRITERS * PER_WRITER);
                }
            })
        })
        .collect();

    interleaved_insert(&tree, WRITERS, PER_WRITER);
    done.store(true, Ordering::Release);
    for h in readers {
        h.join().unwrap();
    }

    eprintln!("scans_during_inserts: {} scans", scans.load(Ordering::Relaxed));
    verify_all(&tree, WRITERS * PER_WRITER, "scans_during_inserts");

    // Everything is visible to a final scan, in order.
    let mut out = Vec::new();
    tree.range_lookup(&0, usize::MAX, &mut out);
    assert_eq!(out.len() as u64, WRITERS * PER_WRITER);
    assert!(out.iter().enumerate().all(|(i, &(k, _))| k == i as u64));
}

#[test]
fn conversions_race_with_inserts() {
    common::init_tracing();

    let tree: Arc<BlinkHash<u64, Small>> = Arc::new(BlinkHash::new());
    let done = Arc::new(AtomicBool::new(false));

    let converter = {
        let tree = Arc::clone(&tree);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut total = 0;
            while !done.load(Ordering::Acquire) {
                total += tree.convert_all();
            }
            total
        })
    };

    interleaved_insert(&tree, 4, 10_000);
    done.store(true, Ordering::Release);
    let converted = converter.join().unwrap() + tree.convert_all();

    assert!(converted > 0);
    assert_eq!(tree.stats().hash_leaves, 0);
    verify_all(&tree, 40_000, "conversions_race_with_inserts");
}

// =============================================================================
//  Mixed point operations
// =============================================================================

#[test]
fn mixed_updates_and_removes() {
    common::init_tracing();

    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 10_000;

    let tree: Arc<BlinkHash<u64, Small>> = Arc::new(BlinkHash::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let guard = tree.guard();
                for i in 0..PER_THREAD {
                    let k = i * THREADS + t;
                    tree.insert_with_guard(k, 0, &guard);
                    assert!(tree.update_with_guard(&k, k + 1, &guard));
                    if i % 3 == 0 {
                        assert_eq!(tree.remove_with_guard(&k, &guard), Some(k + 1));
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let guard = tree.guard();
    let mut expected = 0;
    for k in 0..THREADS * PER_THREAD {
        let i = k / THREADS;
        let want = if i % 3 == 0 { None } else { Some(k + 1) };
        assert_eq!(tree.lookup_with_guard(&k, &guard), want, "key {k}");
        expected += usize::from(want.is_some());
    }
    assert_eq!(tree.len(), expected);
    tree.check_invariants().unwrap();
}

#[test]
fn repeated_small_runs() {
    for _ in 0..10 {
        let tree: Arc<BlinkHash<u64, SortedConfig>> = Arc::new(BlinkHash::new());
        interleaved_insert(&tree, 4, 2_000);
        verify_all(&tree, 8_000, "repeated_small_runs");
    }
}
