//! Filepath: src/bucket.rs
//!
//! Fingerprint-filtered entry group inside a hash leaf.
//!
//! A [`Bucket`] holds [`BUCKET_SLOTS`] entries. Each slot carries a one-byte
//! fingerprint (zero means empty); a lookup compares all fingerprints at once
//! with [`match_mask`] and only then compares full keys, lowest slot first.
//!
//! # Concurrency
//!
//! Every bucket has its own [`VersionedLock`]. Writers hold it for every
//! mutation. Readers snapshot it, read, and validate.
//!
//! Writers publish a slot by storing the key and value first and the
//! fingerprint last; clearing a slot clears only the fingerprint.
//!
//! # Migration state
//!
//! After a hash leaf splits, bucket `i` of the left half and bucket `i` of
//! the right half form a pair tagged [`BucketState::LinkedLeft`] /
//! [`BucketState::LinkedRight`]. Until the pair is settled, entries that
//! belong to the right half still sit in the left bucket. [`settle`] moves
//! them and marks both buckets [`BucketState::Stable`].

use std::sync::atomic::{AtomicU8, AtomicU64};

use crate::config::BUCKET_SLOTS;
use crate::key::IndexKey;
use crate::ksearch::simd::{SlotMask, first_slot, match_mask, slots};
use crate::nodeversion::VersionedLock;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

/// Fingerprint of an empty slot.
pub const EMPTY_FP: u8 = 0;

/// Fingerprint bytes per packed word.
const FP_PER_WORD: usize = 8;

/// Packed fingerprint words per bucket.
const FP_WORDS: usize = BUCKET_SLOTS / FP_PER_WORD;

// ============================================================================
//  BucketState
// ============================================================================

/// Split-migration state of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BucketState {
    /// Every entry is on the correct side.
    Stable = 0,

    /// Left half of an unsettled pair: may still hold entries above the
    /// split boundary.
    LinkedLeft = 1,

    /// Right half of an unsettled pair: its entries may still live in the
    /// left partner.
    LinkedRight = 2,
}

impl BucketState {
    #[inline(always)]
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::LinkedLeft,
            2 => Self::LinkedRight,
            _ => Self::Stable,
        }
    }
}

// ============================================================================
//  Bucket
// ============================================================================

/// Fixed-capacity entry group with packed fingerprints.
pub struct Bucket<K: IndexKey> {
    version: VersionedLock,
    state: AtomicU8,
    fingerprints: [AtomicU64; FP_WORDS],
    keys: [K::Slot; BUCKET_SLOTS],
    values: [AtomicU64; BUCKET_SLOTS],
}

impl<K: IndexKey> Bucket<K> {
    /// Create an empty bucket in the given migration state.
    #[must_use]
    pub fn new(state: BucketState) -> Self {
        Self {
            version: VersionedLock::new(),
            state: AtomicU8::new(state as u8),
            fingerprints: std::array::from_fn(|_| AtomicU64::new(0)),
            keys: std::array::from_fn(|_| K::empty_slot()),
            values: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// The bucket's own lock.
    #[inline(always)]
    #[must_use]
    pub const fn version(&self) -> &VersionedLock {
        &self.version
    }

    /// Current migration state.
    #[inline(always)]
    #[must_use]
    pub fn state(&self) -> BucketState {
        BucketState::from_u8(self.state.load(READ_ORD))
    }

    /// Change the migration state. Caller holds the lock.
    #[inline(always)]
    pub fn set_state(&self, state: BucketState) {
        self.state.store(state as u8, WRITE_ORD);
    }

    /// Snapshot of all fingerprint bytes.
    #[inline]
    #[must_use]
    pub fn fingerprints(&self) -> [u8; BUCKET_SLOTS] {
        let mut out: [u8; BUCKET_SLOTS] = [0; BUCKET_SLOTS];

        for (word, chunk) in self
            .fingerprints
            .iter()
            .zip(out.chunks_exact_mut(FP_PER_WORD))
        {
            chunk.copy_from_slice(&word.load(READ_ORD).to_le_bytes());
        }

        out
    }

    #[inline]
    fn set_fingerprint(&self, slot: usize, fp: u8) {
        let word: &AtomicU64 = &self.fingerprints[slot / FP_PER_WORD];
        let shift: usize = (slot % FP_PER_WORD) * 8;

        // Single writer under the bucket lock: load-modify-store is enough.
        let old: u64 = word.load(RELAXED);
        let new: u64 = (old & !(0xFF << shift)) | (u64::from(fp) << shift);
        word.store(new, WRITE_ORD);
    }

    /// Slots whose fingerprint equals `fp`.
    #[inline]
    #[must_use]
    pub fn matching(&self, fp: u8) -> SlotMask {
        match_mask(&self.fingerprints(), fp)
    }

    /// Key stored in `slot`.
    #[inline(always)]
    #[must_use]
    pub fn key(&self, slot: usize) -> K {
        K::load(&self.keys[slot])
    }

    /// Value stored in `slot`.
    #[inline(always)]
    #[must_use]
    pub fn value(&self, slot: usize) -> u64 {
        self.values[slot].load(READ_ORD)
    }

    /// Slot holding `key`, if any.
    ///
    /// Safe to call optimistically; the caller validates the version.
    #[inline]
    #[must_use]
    pub fn find(&self, key: &K, fp: u8) -> Option<usize> {
        slots(self.matching(fp)).find(|&slot| self.key(slot) == *key)
    }

    /// Value stored under `key`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &K, fp: u8) -> Option<u64> {
        self.find(key, fp).map(|slot| self.value(slot))
    }

    /// Lowest empty slot.
    #[inline]
    #[must_use]
    pub fn free_slot(&self) -> Option<usize> {
        first_slot(self.matching(EMPTY_FP))
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        BUCKET_SLOTS - self.matching(EMPTY_FP).count_ones() as usize
    }

    /// True when no slot is occupied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    //  Locked mutation
    // ========================================================================

    /// Fill an empty slot. Caller holds the lock.
    #[inline]
    pub fn insert_at(&self, slot: usize, key: K, fp: u8, value: u64) {
        debug_assert!(fp != EMPTY_FP, "insert_at: empty fingerprint");
        K::store(&self.keys[slot], key);
        self.values[slot].store(value, WRITE_ORD);
        self.set_fingerprint(slot, fp);
    }

    /// Insert into the lowest free slot. Returns `false` when full.
    #[inline]
    pub fn try_insert(&self, key: K, fp: u8, value: u64) -> bool {
        match self.free_slot() {
            Some(slot) => {
                self.insert_at(slot, key, fp, value);
                true
            }
            None => false,
        }
    }

    /// Overwrite the value in `slot`, returning the previous one. Caller holds the lock.
    #[inline]
    pub fn replace_value(&self, slot: usize, value: u64) -> u64 {
        self.values[slot].swap(value, WRITE_ORD)
    }

    /// Empty `slot`, returning its value. Caller holds the lock.
    #[inline]
    pub fn clear(&self, slot: usize) -> u64 {
        let value: u64 = self.value(slot);
        self.set_fingerprint(slot, EMPTY_FP);
        value
    }

    /// Live `(key, value)` pairs in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        let fps: [u8; BUCKET_SLOTS] = self.fingerprints();

        (0..BUCKET_SLOTS)
            .filter(move |&slot| fps[slot] != EMPTY_FP)
            .map(|slot| (self.key(slot), self.value(slot)))
    }

    /// Live `(slot, key)` pairs; used when entries must be moved.
    fn occupied(&self) -> impl Iterator<Item = (usize, u8, K)> + '_ {
        let fps: [u8; BUCKET_SLOTS] = self.fingerprints();

        (0..BUCKET_SLOTS)
            .filter(move |&slot| fps[slot] != EMPTY_FP)
            .map(move |slot| (slot, fps[slot], self.key(slot)))
    }
}

impl<K: IndexKey> std::fmt::Debug for Bucket<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("state", &self.state())
            .field("len", &self.len())
            .field("version", &self.version.value())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Pair settlement
// ============================================================================

/// Move every entry of `left` whose key exceeds `boundary` into `right`, then
/// mark both buckets stable.
///
/// Caller holds both locks (or owns `right` privately). `right` is empty
/// whenever the pair is unsettled, so the moved entries always fit.
///
/// Returns the number of moved entries.
pub fn settle<K: IndexKey>(left: &Bucket<K>, right: &Bucket<K>, boundary: &K) -> usize {
    let mut moved: usize = 0;

    for (slot, fp, key) in left.occupied() {
        if key <= *boundary {
            continue;
        }

        let placed: bool = right.try_insert(key, fp, left.value(slot));
        debug_assert!(placed, "settle: right partner overflow");

        if placed {
            left.clear(slot);
            moved += 1;
        }
    }

    left.set_state(BucketState::Stable);
    right.set_state(BucketState::Stable);
    moved
}
