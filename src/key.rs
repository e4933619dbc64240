//! Filepath: src/key.rs
//!
//! Fixed-width index keys.
//!
//! Every key stored in a node lives in an atomic slot so optimistic readers
//! can load it while a writer holds the lock. A torn multi-word read is
//! harmless: the reader's version validation rejects it afterwards.
//!
//! Implementations are provided for `u64` (one `AtomicU64`) and for byte
//! blobs `[u8; N]` (one `AtomicU8` per byte, compared lexicographically).

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64};

use crate::ordering::{READ_ORD, WRITE_ORD};

/// A fixed-width, totally ordered, trivially copyable key.
pub trait IndexKey: Copy + Ord + Hash + Debug + Send + Sync + 'static {
    /// Atomic storage for one key.
    type Slot: Send + Sync;

    /// An empty slot. Its content is unspecified until the first store.
    fn empty_slot() -> Self::Slot;

    /// Load a key from a slot.
    fn load(slot: &Self::Slot) -> Self;

    /// Store a key into a slot. Caller must hold the owner's write lock.
    fn store(slot: &Self::Slot, key: Self);
}

impl IndexKey for u64 {
    type Slot = AtomicU64;

    #[inline(always)]
    fn empty_slot() -> Self::Slot {
        AtomicU64::new(0)
    }

    #[inline(always)]
    fn load(slot: &Self::Slot) -> Self {
        slot.load(READ_ORD)
    }

    #[inline(always)]
    fn store(slot: &Self::Slot, key: Self) {
        slot.store(key, WRITE_ORD);
    }
}

impl<const N: usize> IndexKey for [u8; N] {
    type Slot = [AtomicU8; N];

    #[inline]
    fn empty_slot() -> Self::Slot {
        std::array::from_fn(|_| AtomicU8::new(0))
    }

    #[inline]
    fn load(slot: &Self::Slot) -> Self {
        std::array::from_fn(|i| slot[i].load(READ_ORD))
    }

    #[inline]
    fn store(slot: &Self::Slot, key: Self) {
        for (cell, byte) in slot.iter().zip(key) {
            cell.store(byte, WRITE_ORD);
        }
    }
}

// ============================================================================
//  HighKey
// ============================================================================

/// Optional upper bound of a node's key range.
///
/// Absent means the node is the rightmost on its level.
pub struct HighKey<K: IndexKey> {
    present: AtomicBool,
    key: K::Slot,
}

impl<K: IndexKey> HighKey<K> {
    /// Create a high key.
    #[must_use]
    pub fn new(bound: Option<K>) -> Self {
        let this = Self {
            present: AtomicBool::new(false),
            key: K::empty_slot(),
        };
        this.store(bound);
        this
    }

    /// Load the bound.
    #[inline]
    #[must_use]
    pub fn load(&self) -> Option<K> {
        if self.present.load(READ_ORD) {
            Some(K::load(&self.key))
        } else {
            None
        }
    }

    /// Replace the bound. Caller must hold the node's write lock.
    #[inline]
    pub fn store(&self, bound: Option<K>) {
        match bound {
            Some(key) => {
                K::store(&self.key, key);
                self.present.store(true, WRITE_ORD);
            }
            None => self.present.store(false, WRITE_ORD),
        }
    }

    /// Whether `key` lies beyond this bound (the owner must be left for its sibling).
    #[inline]
    #[must_use]
    pub fn is_exceeded_by(&self, key: &K) -> bool {
        self.load().is_some_and(|high| high < *key)
    }
}

impl<K: IndexKey> Debug for HighKey<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.load() {
            Some(key) => write!(f, "HighKey({key:?})"),
            None => write!(f, "HighKey(+inf)"),
        }
    }
}
