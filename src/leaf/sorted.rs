//! Filepath: src/leaf/sorted.rs
//!
//! Ordered-array leaf body.
//!
//! Entries are kept sorted by key in `keys[..count]` / `values[..count]`.
//! Mutations require the owning node's write lock; readers copy what they
//! need and validate the node version afterwards. Because a reader may see
//! a shift in progress, every read clamps `count` to the capacity and never
//! trusts a slot past it.

use std::sync::atomic::{AtomicU64, AtomicUsize};

use crate::key::IndexKey;
use crate::ksearch;
use crate::ordering::{READ_ORD, WRITE_ORD};

use super::LeafInsert;

/// Fixed-capacity sorted leaf.
pub struct SortedLeaf<K: IndexKey> {
    count: AtomicUsize,
    keys: Box<[K::Slot]>,
    values: Box<[AtomicU64]>,
}

impl<K: IndexKey> SortedLeaf<K> {
    /// Create an empty leaf holding up to `width` entries.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            keys: (0..width).map(|_| K::empty_slot()).collect(),
            values: (0..width).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Create a leaf from entries already sorted by key.
    #[must_use]
    pub fn from_sorted(width: usize, entries: &[(K, u64)]) -> Self {
        debug_assert!(entries.len() <= width, "from_sorted: too many entries");
        debug_assert!(
            entries.windows(2).all(|w| w[0].0 < w[1].0),
            "from_sorted: entries not strictly ascending"
        );

        let leaf = Self::new(width);
        for (i, &(key, value)) in entries.iter().take(width).enumerate() {
            leaf.write(i, key, value);
        }
        leaf.count.store(entries.len().min(width), WRITE_ORD);
        leaf
    }

    /// Entry capacity.
    #[inline(always)]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Number of entries, clamped to the capacity.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(READ_ORD).min(self.capacity())
    }

    /// True when the leaf holds nothing.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when no entry can be added without a split.
    #[inline(always)]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Key at `i`.
    #[inline(always)]
    #[must_use]
    pub fn key(&self, i: usize) -> K {
        K::load(&self.keys[i])
    }

    /// Value at `i`.
    #[inline(always)]
    #[must_use]
    pub fn value(&self, i: usize) -> u64 {
        self.values[i].load(READ_ORD)
    }

    #[inline(always)]
    fn write(&self, i: usize, key: K, value: u64) {
        K::store(&self.keys[i], key);
        self.values[i].store(value, WRITE_ORD);
    }

    #[inline]
    fn search(&self, key: &K) -> (usize, bool) {
        ksearch::search(self.len(), key, |i| self.key(i))
    }

    // ========================================================================
    //  Reads (optimistic, caller validates)
    // ========================================================================

    /// Value stored under `key`.
    #[inline]
    #[must_use]
    pub fn lookup(&self, key: &K) -> Option<u64> {
        match self.search(key) {
            (idx, true) => Some(self.value(idx)),
            _ => None,
        }
    }

    /// Append up to `limit` entries with key >= `min` to `out`, in order.
    ///
    /// Returns the number appended.
    pub fn scan(&self, min: &K, limit: usize, out: &mut Vec<(K, u64)>) -> usize {
        let len: usize = self.len();
        let start: usize = ksearch::lower_bound(len, min, |i| self.key(i));
        let end: usize = len.min(start.saturating_add(limit));

        for i in start..end {
            out.push((self.key(i), self.value(i)));
        }

        end - start
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        (0..self.len()).map(|i| (self.key(i), self.value(i)))
    }

    // ========================================================================
    //  Writes (caller holds the node lock)
    // ========================================================================

    /// Insert or overwrite.
    ///
    /// Reports [`LeafInsert::NeedsSplit`] when the key is new and the leaf is full.
    pub fn insert(&self, key: K, value: u64) -> LeafInsert {
        let (idx, found) = self.search(&key);

        if found {
            let old: u64 = self.values[idx].swap(value, WRITE_ORD);
            return LeafInsert::Success(Some(old));
        }

        let len: usize = self.len();
        if len >= self.capacity() {
            return LeafInsert::NeedsSplit;
        }

        for i in (idx..len).rev() {
            self.write(i + 1, self.key(i), self.value(i));
        }
        self.write(idx, key, value);
        self.count.store(len + 1, WRITE_ORD);

        LeafInsert::Success(None)
    }

    /// Overwrite the value of an existing key.
    pub fn update(&self, key: &K, value: u64) -> bool {
        match self.search(key) {
            (idx, true) => {
                self.values[idx].store(value, WRITE_ORD);
                true
            }
            _ => false,
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<u64> {
        let (idx, found) = self.search(key);
        if !found {
            return None;
        }

        let old: u64 = self.value(idx);
        let len: usize = self.len();

        for i in idx + 1..len {
            self.write(i - 1, self.key(i), self.value(i));
        }
        self.count.store(len - 1, WRITE_ORD);

        Some(old)
    }

    /// Move the upper half into a new leaf.
    ///
    /// The entry at the median index stays left and becomes the separator.
    /// Returns `(separator, right)`; the caller makes `separator` this
    /// node's high key.
    pub fn split(&self) -> (K, Self) {
        let len: usize = self.len();
        debug_assert!(len >= 2, "split: leaf too small");

        let mid: usize = (len - 1) / 2;
        let separator: K = self.key(mid);

        let right = Self::new(self.capacity());
        for (dst, src) in (mid + 1..len).enumerate() {
            right.write(dst, self.key(src), self.value(src));
        }
        right.count.store(len - mid - 1, WRITE_ORD);
        self.count.store(mid + 1, WRITE_ORD);

        (separator, right)
    }
}

impl<K: IndexKey> std::fmt::Debug for SortedLeaf<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedLeaf")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
