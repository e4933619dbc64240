//! Loom tests for `VersionedLock`.
//!
//! Loom provides deterministic concurrency testing by exploring all possible
//! thread interleavings.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib nodeversion::loom_tests`
//!
//! NOTE: Loom tests use loom's own atomic types, so the lock protocol is
//! restated here over `loom::sync::atomic::AtomicU64` with identical bit
//! layout and orderings.

use loom::sync::Arc;
use loom::sync::atomic::{AtomicU64, Ordering, fence};
use loom::thread;

const OBSOLETE_BIT: u64 = 1 << 0;
const LOCK_BIT: u64 = 1 << 1;
const LOCK_INCREMENT: u64 = LOCK_BIT;
const UNSTABLE_MASK: u64 = OBSOLETE_BIT | LOCK_BIT;

/// `VersionedLock` over loom atomics.
struct LoomLock {
    value: AtomicU64,
}

impl LoomLock {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    fn read_snapshot(&self) -> Option<u64> {
        let value = self.value.load(Ordering::Acquire);
        (value & UNSTABLE_MASK == 0).then_some(value)
    }

    fn validate(&self, snapshot: u64) -> bool {
        fence(Ordering::Acquire);
        self.value.load(Ordering::Relaxed) == snapshot
    }

    fn try_upgrade(&self, snapshot: u64) -> bool {
        if snapshot & UNSTABLE_MASK != 0 {
            return false;
        }
        let ok = self
            .value
            .compare_exchange(
                snapshot,
                snapshot + LOCK_INCREMENT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if ok {
            fence(Ordering::Release);
        }
        ok
    }

    fn lock(&self) {
        loop {
            let v = self.value.load(Ordering::Relaxed);
            if v & UNSTABLE_MASK == 0 && self.try_upgrade(v) {
                return;
            }
            thread::yield_now();
        }
    }

    fn unlock(&self) {
        self.value.fetch_add(LOCK_INCREMENT, Ordering::Release);
    }
}

/// Two writers incrementing a pair of fields under the lock never interleave.
#[test]
fn loom_writers_are_exclusive() {
    loom::model(|| {
        let lock = Arc::new(LoomLock::new());
        let data = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let data = Arc::clone(&data);
                thread::spawn(move || {
                    lock.lock();
                    let v = data.load(Ordering::Relaxed);
                    data.store(v + 1, Ordering::Relaxed);
                    lock.unlock();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(data.load(Ordering::Relaxed), 2);
        assert_eq!(lock.value.load(Ordering::Relaxed), 4 * LOCK_INCREMENT);
    });
}

/// A validated optimistic read never observes a half-finished write.
#[test]
fn loom_validated_read_is_consistent() {
    loom::model(|| {
        let lock = Arc::new(LoomLock::new());
        let a = Arc::new(AtomicU64::new(0));
        let b = Arc::new(AtomicU64::new(0));

        let writer = {
            let (lock, a, b) = (Arc::clone(&lock), Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                lock.lock();
                a.store(1, Ordering::Relaxed);
                b.store(1, Ordering::Relaxed);
                lock.unlock();
            })
        };

        if let Some(snapshot) = lock.read_snapshot() {
            let x = a.load(Ordering::Relaxed);
            let y = b.load(Ordering::Relaxed);
            if lock.validate(snapshot) {
                assert_eq!(x, y);
            }
        }

        writer.join().unwrap();
    });
}

/// Upgrading from the same snapshot succeeds for exactly one thread.
#[test]
fn loom_upgrade_single_winner() {
    loom::model(|| {
        let lock = Arc::new(LoomLock::new());
        let snapshot = lock.read_snapshot().unwrap();

        let other = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.try_upgrade(snapshot))
        };

        let mine = lock.try_upgrade(snapshot);
        let theirs = other.join().unwrap();

        assert!(mine ^ theirs);
    });
}
