//! Filepath: src/nodeversion.rs
//!
//! Versioned lock for optimistic lock coupling.
//!
//! [`VersionedLock`] packs an obsolete flag, a locked flag and a version
//! counter into one `u64`. Readers never block: they take a snapshot, read
//! node fields, and validate the snapshot afterwards. Writers acquire the lock
//! with a CAS and receive a [`LockGuard`] that releases it on drop.
//!
//! # Concurrency Model
//! 1. Readers: `read_snapshot()` → read fields → `validate()`.
//! 2. Writers: `try_writelock()` or `try_upgrade_writelock(snapshot)`, modify,
//!    let the guard drop (or consume it with `write_unlock_obsolete()`).
//!
//! Every failure is reported as [`Restart`]. Callers propagate it with `?`
//! up to the outermost loop of the public operation, which starts over from
//! the root. No partial step is ever retried in place.
//!
//! # Layout
//! Bit 0: `obsolete` | Bit 1: `locked` | Bits 2-63: version
//!
//! Lock and unlock both add the lock increment, so the version observed by
//! readers advances on every write cycle.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering, fence};

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, RELAXED, UNLOCK_ORD, VERSION_ORD};


#[cfg(all(test, loom))]
mod loom_tests;

// ============================================================================
//  Bit Constants
// ============================================================================

/// Obsolete bit: the node or bucket was retired and must not be used.
const OBSOLETE_BIT: u64 = 1 << 0;

/// Lock bit: a writer holds the lock.
const LOCK_BIT: u64 = 1 << 1;

/// Added on lock and again on unlock. The second add carries into the version.
const LOCK_INCREMENT: u64 = LOCK_BIT;

/// Snapshot bits that force a reader to restart.
const UNSTABLE_MASK: u64 = OBSOLETE_BIT | LOCK_BIT;

// ============================================================================
//  Restart
// ============================================================================

/// Optimistic validation failed. The whole operation must start over.
///
/// Zero-sized so it can flow through `Result<T, Restart>` and `?` at no cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Restart;

impl std::fmt::Display for Restart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "optimistic validation failed, restart required")
    }
}

impl std::error::Error for Restart {}

// ============================================================================
//  VersionedLock
// ============================================================================

/// Atomic version word shared by every node and bucket.
///
/// # Example
///
/// ```rust
/// use blinkhash::nodeversion::VersionedLock;
///
/// let lock = VersionedLock::new();
/// let snapshot = lock.read_snapshot().unwrap();
///
/// {
///     let _guard = lock.try_upgrade_writelock(snapshot).unwrap();
///     assert!(lock.is_locked());
/// }
///
/// // The write cycle advanced the version, so the old snapshot is stale.
/// assert!(lock.validate(snapshot).is_err());
/// ```
#[derive(Debug, Default)]
pub struct VersionedLock {
    value: AtomicU64,
}

impl VersionedLock {
    /// Create an unlocked lock at version zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Create a lock from a raw word.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// Raw word, for diagnostics.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(RELAXED)
    }

    /// Check whether a writer currently holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        (self.value.load(RELAXED) & LOCK_BIT) != 0
    }

    /// Check whether the owner was retired.
    #[inline]
    #[must_use]
    pub fn is_obsolete(&self) -> bool {
        (self.value.load(RELAXED) & OBSOLETE_BIT) != 0
    }

    // ========================================================================
    //  Optimistic Reads
    // ========================================================================

    /// Take a version snapshot for an optimistic read.
    ///
    /// Never blocks. Fails if the lock is held or the owner is obsolete.
    ///
    /// # Errors
    /// [`Restart`] when the snapshot is unusable.
    #[inline]
    pub fn read_snapshot(&self) -> Result<u64, Restart> {
        let value: u64 = self.value.load(VERSION_ORD);

        if value & UNSTABLE_MASK != 0 {
            return Err(Restart);
        }

        Ok(value)
    }

    /// Re-read the word and compare it with an earlier snapshot.
    ///
    /// The acquire fence orders all field reads made since the snapshot
    /// before the re-read, pairing with the release fence taken by writers
    /// right after they lock.
    ///
    /// # Errors
    /// [`Restart`] if any writer locked the word since `snapshot`.
    #[inline]
    pub fn validate(&self, snapshot: u64) -> Result<(), Restart> {
        fence(Ordering::Acquire);

        if self.value.load(RELAXED) == snapshot {
            Ok(())
        } else {
            Err(Restart)
        }
    }

    /// Check validity without consuming a `Result`.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, snapshot: u64) -> bool {
        self.validate(snapshot).is_ok()
    }

    // ========================================================================
    //  Write Locking (Type-State Pattern)
    // ========================================================================

    /// Try to lock from whatever unlocked version is current.
    ///
    /// Non-blocking: returns `None` if locked, obsolete, or the CAS lost a race.
    #[inline]
    #[must_use]
    pub fn try_writelock(&self) -> Option<LockGuard<'_>> {
        let value: u64 = self.value.load(RELAXED);

        if value & UNSTABLE_MASK != 0 {
            return None;
        }

        self.try_upgrade_writelock(value)
    }

    /// Lock only if the word still equals `snapshot`.
    ///
    /// Any writer that ran since the snapshot was taken makes this fail, so a
    /// successful upgrade proves everything read under the snapshot is current.
    #[inline]
    #[must_use]
    pub fn try_upgrade_writelock(&self, snapshot: u64) -> Option<LockGuard<'_>> {
        if snapshot & UNSTABLE_MASK != 0 {
            return None;
        }

        let locked: u64 = snapshot + LOCK_INCREMENT;

        self.value
            .compare_exchange(snapshot, locked, CAS_SUCCESS, CAS_FAILURE)
            .ok()?;

        // Field stores made under the lock must not become visible before
        // the lock bit itself.
        fence(Ordering::Release);

        Some(LockGuard {
            lock: self,
            _marker: PhantomData,
        })
    }

    /// Spin (with backoff) until the lock is acquired or `budget` attempts fail.
    ///
    /// Used where the holder is known never to wait on the caller, such as a
    /// split draining in-flight bucket writers.
    #[must_use]
    pub fn writelock_bounded(&self, budget: u32) -> Option<LockGuard<'_>> {
        let mut backoff = Backoff::new();

        for _ in 0..budget {
            if self.is_obsolete() {
                return None;
            }

            if let Some(guard) = self.try_writelock() {
                return Some(guard);
            }

            backoff.snooze();
        }

        None
    }

    /// Raw unlock: advance the version and clear the lock bit.
    fn write_unlock_raw(&self) {
        self.value.fetch_add(LOCK_INCREMENT, UNLOCK_ORD);
    }

    /// Raw unlock that also sets the obsolete bit permanently.
    fn write_unlock_obsolete_raw(&self) {
        self.value
            .fetch_add(LOCK_INCREMENT | OBSOLETE_BIT, UNLOCK_ORD);
    }
}

// ============================================================================
//  LockGuard
// ============================================================================

/// Zero-cost proof that a [`VersionedLock`] is write-locked.
///
/// Obtainable only through [`VersionedLock::try_writelock`] and friends.
/// Releasing happens on drop (panic-safe) and always advances the version.
///
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`: a lock must be
/// released by the thread that took it.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the lock"]
pub struct LockGuard<'a> {
    lock: &'a VersionedLock,
    _marker: PhantomData<*mut ()>,
}

impl LockGuard<'_> {
    /// The lock this guard holds.
    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &VersionedLock {
        self.lock
    }

    /// Release the lock, advancing the version.
    #[inline]
    pub fn write_unlock(self) {
        drop(self);
    }

    /// Release the lock and mark the owner obsolete forever.
    ///
    /// In-flight readers holding an older snapshot fail validation, and new
    /// snapshots are refused.
    #[inline]
    pub fn write_unlock_obsolete(self) {
        let lock: &VersionedLock = self.lock;
        std::mem::forget(self);
        lock.write_unlock_obsolete_raw();
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.write_unlock_raw();
    }
}

// ============================================================================
//  Backoff
// ============================================================================

/// Spin iterations (as a power of two) before switching to `yield_now`.
const SPIN_LIMIT: u32 = 6;

/// Exponential spin, then yield, for retry loops.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    /// Create a fresh backoff.
    #[must_use]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Wait a little longer than last time.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
            self.step += 1;
        } else {
            std::thread::yield_now();
        }
    }

    /// Whether the spin phase is over.
    #[inline]
    #[must_use]
    pub const fn is_yielding(&self) -> bool {
        self.step > SPIN_LIMIT
    }
}
