//! Shuttle tests for the bucket-lock versus node-split protocol.
//!
//! Shuttle explores randomized thread schedules. The model below keeps only
//! the synchronization skeleton of a hash leaf: a node version word, bucket
//! version words and one value slot per bucket. A point writer locks its
//! bucket and validates the node snapshot taken before; a splitter locks the
//! node, then drains the buckets and moves their values to the right half.
//! No schedule may lose a write.
//!
//! Run with: `cargo test --lib tree::shuttle_tests`

use shuttle::sync::Arc;
use shuttle::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use shuttle::thread;

const LOCKED: u64 = 2;
const DRAIN_BUDGET: usize = 8;
const BUCKETS: usize = 2;

// ============================================================================
//  Model
// ============================================================================

struct ModelLeaf {
    node: AtomicU64,
    buckets: Vec<AtomicU64>,
    values: Vec<AtomicU64>,
    right: Vec<AtomicU64>,
    moved: AtomicBool,
}

fn try_lock(word: &AtomicU64) -> Option<u64> {
    let v = word.load(Ordering::Acquire);
    if v & LOCKED != 0 {
        return None;
    }
    word.compare_exchange(v, v + LOCKED, Ordering::AcqRel, Ordering::Acquire)
        .ok()
}

fn unlock(word: &AtomicU64) {
    word.fetch_add(LOCKED, Ordering::Release);
}

impl ModelLeaf {
    fn new() -> Self {
        Self {
            node: AtomicU64::new(0),
            buckets: (0..BUCKETS).map(|_| AtomicU64::new(0)).collect(),
            values: (0..BUCKETS).map(|_| AtomicU64::new(0)).collect(),
            right: (0..BUCKETS).map(|_| AtomicU64::new(0)).collect(),
            moved: AtomicBool::new(false),
        }
    }

    /// One point-write attempt. `false` means restart.
    fn try_write(&self, bucket: usize, value: u64) -> bool {
        let snapshot = self.node.load(Ordering::Acquire);
        if snapshot & LOCKED != 0 || self.moved.load(Ordering::Acquire) {
            return false;
        }

        if try_lock(&self.buckets[bucket]).is_none() {
            return false;
        }

        // Validate the node while holding the bucket lock.
        if self.node.load(Ordering::Acquire) != snapshot {
            unlock(&self.buckets[bucket]);
            return false;
        }

        self.values[bucket].store(value, Ordering::Relaxed);
        unlock(&self.buckets[bucket]);
        true
    }

    /// Write, moving to the right half once the split has happened.
    fn write(&self, bucket: usize, value: u64) {
        loop {
            if self.moved.load(Ordering::Acquire) {
                self.right[bucket].store(value, Ordering::Relaxed);
                return;
            }
            if self.try_write(bucket, value) {
                return;
            }
            thread::yield_now();
        }
    }

    /// One split attempt. `false` means a bucket did not drain.
    fn try_split(&self) -> bool {
        if try_lock(&self.node).is_none() {
            return false;
        }

        let mut held: Vec<usize> = Vec::new();
        for idx in 0..BUCKETS {
            let mut locked = false;
            for _ in 0..DRAIN_BUDGET {
                if try_lock(&self.buckets[idx]).is_some() {
                    locked = true;
                    break;
                }
                thread::yield_now();
            }
            if !locked {
                for &h in &held {
                    unlock(&self.buckets[h]);
                }
                unlock(&self.node);
                return false;
            }
            held.push(idx);
        }

        for idx in 0..BUCKETS {
            let v = self.values[idx].load(Ordering::Relaxed);
            self.right[idx].store(v, Ordering::Relaxed);
        }
        self.moved.store(true, Ordering::Release);

        for idx in held {
            unlock(&self.buckets[idx]);
        }
        unlock(&self.node);
        true
    }

    fn split(&self) {
        while !self.try_split() {
            thread::yield_now();
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[test]
fn test_write_survives_split() {
    shuttle::check_random(
        || {
            let leaf = Arc::new(ModelLeaf::new());

            let writer = {
                let leaf = Arc::clone(&leaf);
                thread::spawn(move || leaf.write(0, 42))
            };
            let splitter = {
                let leaf = Arc::clone(&leaf);
                thread::spawn(move || leaf.split())
            };

            writer.join().unwrap_or_default();
            splitter.join().unwrap_or_default();

            assert!(leaf.moved.load(Ordering::Acquire));
            assert_eq!(leaf.right[0].load(Ordering::Relaxed), 42, "write lost by split");
        },
        1_000,
    );
}

#[test]
fn test_two_writers_and_split() {
    shuttle::check_random(
        || {
            let leaf = Arc::new(ModelLeaf::new());

            let handles: Vec<_> = (0..BUCKETS)
                .map(|b| {
                    let leaf = Arc::clone(&leaf);
                    thread::spawn(move || leaf.write(b, 10 + b as u64))
                })
                .chain(std::iter::once({
                    let leaf = Arc::clone(&leaf);
                    thread::spawn(move || leaf.split())
                }))
                .collect();

            for h in handles {
                h.join().unwrap_or_default();
            }

            for b in 0..BUCKETS {
                assert_eq!(leaf.right[b].load(Ordering::Relaxed), 10 + b as u64, "bucket {b}");
            }
        },
        1_000,
    );
}
