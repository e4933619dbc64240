//! Filepath: src/tree.rs
//! `BlinkHash` - a concurrent B-link tree with hash-or-sorted leaves.
//!
//! Inner nodes are ordinary B-link nodes (separators, children, a sibling
//! pointer and an inclusive high key). Leaves start out as hash leaves and
//! are converted to sorted leaves on the first range scan that reaches them.
//!
//! Reads are optimistic: they snapshot node versions and validate after
//! reading, restarting from the root on any failure. Writers take node or
//! bucket locks with `try` semantics only, so a blocked writer restarts
//! instead of waiting.
//!
//! # Submodules
//!
//! - `traverse`: root-to-leaf descent, move-right
//! - `optimistic`: lookup and range lookup
//! - `locked`: insert, update, remove
//! - `split`: split propagation and root growth
//! - `convert`: hash to sorted leaf conversion
//! - `sanity`: invariant checker
//! - `stats`: counters and structural statistics

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize};

use seize::{Collector, LocalGuard};

use crate::alloc::alloc_leaf;
use crate::alloc::reclaim::teardown;
use crate::bucket::BucketState;
use crate::config::{DefaultConfig, LeafMode, TreeConfig};
use crate::key::IndexKey;
use crate::leaf::{HashLeaf, LeafBody, SortedLeaf};
use crate::node::NodePtr;
use crate::nodeversion::{Backoff, Restart};
use crate::ordering::{READ_ORD, RELAXED};

mod convert;
mod locked;
mod optimistic;
mod sanity;
mod split;
mod stats;
mod traverse;

#[cfg(all(test, not(loom)))]
mod shuttle_tests;

pub use sanity::InvariantViolation;
pub use stats::{OpCounters, TreeStats};

use stats::Counters;

// ============================================================================
//  BlinkHash
// ============================================================================

/// Concurrent ordered index from `K` to `u64`.
///
/// Every operation takes `&self`; share the tree through an `Arc` or scoped
/// threads. Methods without a guard argument enter the collector themselves.
///
/// ```rust
/// use blinkhash::BlinkHash;
///
/// let tree: BlinkHash<u64> = BlinkHash::new();
/// assert_eq!(tree.insert(3, 30), None);
/// assert_eq!(tree.insert(3, 31), Some(30));
/// assert_eq!(tree.lookup(&3), Some(31));
///
/// let mut out = Vec::new();
/// assert_eq!(tree.range_lookup(&0, 10, &mut out), 1);
/// assert_eq!(out, vec![(3, 31)]);
/// ```
pub struct BlinkHash<K: IndexKey, C: TreeConfig = DefaultConfig> {
    /// Reclaims leaf bodies replaced by conversion.
    collector: Collector,

    /// Current root (a leaf while the tree has one node).
    root: AtomicPtr<crate::node::NodeHeader<K>>,

    /// Live entries, maintained on insert and remove.
    count: AtomicUsize,

    counters: Counters,

    _config: PhantomData<C>,
}

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Create an empty tree: a single leaf, hash or sorted per
    /// [`TreeConfig::LEAF_MODE`].
    ///
    /// # Panics
    /// If the configuration is unusable (see [`TreeConfig::validate`]).
    #[must_use]
    pub fn new() -> Self {
        C::validate();

        let root: NodePtr<K> = alloc_leaf(Self::new_leaf_body(), std::ptr::null_mut(), None);

        Self {
            collector: Collector::new(),
            root: AtomicPtr::new(root),
            count: AtomicUsize::new(0),
            counters: Counters::default(),
            _config: PhantomData,
        }
    }

    /// Body of a fresh, empty leaf.
    fn new_leaf_body() -> Box<LeafBody<K>> {
        Box::new(match C::LEAF_MODE {
            LeafMode::Adaptive => LeafBody::Hash(HashLeaf::new(C::HASH_BUCKETS, BucketState::Stable)),
            LeafMode::Sorted => LeafBody::Sorted(SortedLeaf::new(C::SORTED_WIDTH)),
        })
    }

    /// Enter the reclamation collector.
    ///
    /// Hold one guard across a batch of `*_with_guard` calls to amortize the
    /// cost of entering.
    #[must_use]
    #[inline(always)]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Number of entries.
    ///
    /// Exact when no operation is in flight.
    #[must_use]
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count.load(RELAXED)
    }

    /// True when the tree holds nothing.
    #[must_use]
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Levels from the root down to the leaves (1 for a lone leaf).
    #[must_use]
    pub fn height(&self) -> usize {
        // SAFETY: the root pointer is always a live node.
        let level: u32 = unsafe { crate::alloc::header(self.load_root()).level() };
        level as usize + 1
    }

    // ========================================================================
    //  Point operations
    // ========================================================================

    /// Insert or overwrite `key`. Returns the previous value if there was one.
    pub fn insert(&self, key: K, value: u64) -> Option<u64> {
        let guard: LocalGuard<'_> = self.guard();
        self.insert_with_guard(key, value, &guard)
    }

    /// [`Self::insert`] under a caller-held guard.
    pub fn insert_with_guard(&self, key: K, value: u64, guard: &LocalGuard<'_>) -> Option<u64> {
        self.retry(|| self.try_insert(key, value, guard))
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn lookup(&self, key: &K) -> Option<u64> {
        let guard: LocalGuard<'_> = self.guard();
        self.lookup_with_guard(key, &guard)
    }

    /// [`Self::lookup`] under a caller-held guard.
    #[must_use]
    pub fn lookup_with_guard(&self, key: &K, _guard: &LocalGuard<'_>) -> Option<u64> {
        self.retry(|| self.try_lookup(key))
    }

    /// Overwrite the value of an existing key. Returns false if absent.
    pub fn update(&self, key: &K, value: u64) -> bool {
        let guard: LocalGuard<'_> = self.guard();
        self.update_with_guard(key, value, &guard)
    }

    /// [`Self::update`] under a caller-held guard.
    pub fn update_with_guard(&self, key: &K, value: u64, _guard: &LocalGuard<'_>) -> bool {
        self.retry(|| self.try_update(key, value))
    }

    /// Remove `key`, returning its value. Leaves are never merged.
    pub fn remove(&self, key: &K) -> Option<u64> {
        let guard: LocalGuard<'_> = self.guard();
        self.remove_with_guard(key, &guard)
    }

    /// [`Self::remove`] under a caller-held guard.
    pub fn remove_with_guard(&self, key: &K, _guard: &LocalGuard<'_>) -> Option<u64> {
        self.retry(|| self.try_remove(key))
    }

    // ========================================================================
    //  Range operations
    // ========================================================================

    /// Clear `out`, then fill it with up to `range` entries whose keys are
    /// `>= min`, ascending. Returns the number of entries written.
    ///
    /// Hash leaves met on the way are converted to sorted leaves first.
    /// The result is not a snapshot: entries moved by a concurrent split
    /// after their leaf was passed may be missed.
    pub fn range_lookup(&self, min: &K, range: usize, out: &mut Vec<(K, u64)>) -> usize {
        let guard: LocalGuard<'_> = self.guard();
        self.range_lookup_with_guard(min, range, out, &guard)
    }

    /// [`Self::range_lookup`] under a caller-held guard.
    pub fn range_lookup_with_guard(
        &self,
        min: &K,
        range: usize,
        out: &mut Vec<(K, u64)>,
        guard: &LocalGuard<'_>,
    ) -> usize {
        out.clear();
        if range == 0 {
            return 0;
        }
        self.retry(|| self.try_range_lookup(min, range, out, Some(guard)))
    }

    /// Like [`Self::range_lookup`] but never converts: hash leaves are read
    /// by sweeping and sorting their buckets.
    pub fn range_lookup_in_place(&self, min: &K, range: usize, out: &mut Vec<(K, u64)>) -> usize {
        let _guard: LocalGuard<'_> = self.guard();
        out.clear();
        if range == 0 {
            return 0;
        }
        self.retry(|| self.try_range_lookup(min, range, out, None))
    }

    // ========================================================================
    //  Internals
    // ========================================================================

    #[inline(always)]
    fn load_root(&self) -> NodePtr<K> {
        self.root.load(READ_ORD)
    }

    /// Run `attempt` until it stops asking for a restart.
    #[inline]
    fn retry<T>(&self, mut attempt: impl FnMut() -> Result<T, Restart>) -> T {
        let mut backoff: Backoff = Backoff::new();

        loop {
            match attempt() {
                Ok(result) => return result,
                Err(Restart) => {
                    self.counters.restarts.fetch_add(1, RELAXED);
                    backoff.snooze();
                }
            }
        }
    }

    #[inline(always)]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, RELAXED);
    }
}

impl<K: IndexKey, C: TreeConfig> Default for BlinkHash<K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: IndexKey, C: TreeConfig> StdFmt::Debug for BlinkHash<K, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BlinkHash")
            .field("root", &self.root.load(RELAXED))
            .field("count", &self.count.load(RELAXED))
            .field("inner_width", &C::INNER_WIDTH)
            .field("sorted_width", &C::SORTED_WIDTH)
            .field("hash_buckets", &C::HASH_BUCKETS)
            .finish_non_exhaustive()
    }
}

impl<K: IndexKey, C: TreeConfig> Drop for BlinkHash<K, C> {
    fn drop(&mut self) {
        // Unique access: no operation is in flight. Retired bodies are freed
        // when the collector drops after this.
        let root: NodePtr<K> = *self.root.get_mut();

        // SAFETY: exclusive access; every split finished publishing.
        unsafe { teardown(root) };
    }
}

// ============================================================================
//  Tests
// ============================================================================
