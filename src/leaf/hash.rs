//! Filepath: src/leaf/hash.rs
//!
//! Hash leaf body: an unordered array of [`Bucket`]s.
//!
//! Point operations touch only the key's candidate buckets (see
//! [`crate::hash::candidates`]) and never take the node lock:
//!
//! - Readers snapshot each bucket they read and validate it, then validate
//!   the node snapshot taken during descent.
//! - Writers try-lock every distinct candidate bucket in ascending index
//!   order, then validate the node snapshot. A split or conversion holds the
//!   node lock and every bucket lock, so a writer that validates cannot
//!   overlap one.
//!
//! # Lazy split settlement
//!
//! A split leaves the old body (left) and the new body (right) linked:
//! every left bucket is [`BucketState::LinkedLeft`], every right bucket
//! [`BucketState::LinkedRight`], and entries above the split boundary still
//! sit in the left buckets. Each body stores its `partner` and the
//! `boundary`. The first writer to lock either bucket of pair `i` settles
//! the pair (try-locking the partner bucket). Readers never settle: a reader
//! of a `LinkedRight` bucket also reads the partner's bucket `i`.
//!
//! Splits and conversions settle every pair of the body first, so a body is
//! linked to at most one partner at a time and a linked partner is never a
//! retired body.

use std::sync::atomic::AtomicPtr;

use rand::Rng;

use crate::bucket::{Bucket, BucketState, settle};
use crate::config::MedianPolicy;
use crate::hash::{CANDIDATES, candidates, fingerprint, lock_order};
use crate::key::IndexKey;
use crate::nodeversion::{LockGuard, Restart, VersionedLock};
use crate::ordering::{READ_ORD, WRITE_ORD};

use super::sorted::SortedLeaf;
use super::{LeafBody, LeafInsert};

/// Spin budget per bucket when a split or conversion drains bucket writers.
const DRAIN_BUDGET: u32 = 64;

/// Candidate bucket locks held by a point writer, released on drop.
type CandidateLocks<'a> = [Option<LockGuard<'a>>; CANDIDATES];

/// Unordered bucketed leaf.
pub struct HashLeaf<K: IndexKey> {
    buckets: Box<[Bucket<K>]>,
    partner: AtomicPtr<HashLeaf<K>>,
    boundary: K::Slot,
}

/// Where the key that triggered a split ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInsert {
    /// Written; holds the replaced value if the key already existed.
    Inserted(Option<u64>),

    /// Its side of the split had no free candidate slot. The caller retries
    /// the insert once the split is published.
    Full,
}

/// Result of [`HashLeaf::split`].
pub struct HashSplit<K: IndexKey> {
    /// Largest key staying left; the left node's new high key.
    pub split_key: K,

    /// The right half's body, not yet reachable.
    pub right: Box<LeafBody<K>>,

    /// Fate of the key that triggered the split.
    pub pending: PendingInsert,
}

/// Result of [`HashLeaf::convert`]: sorted partitions plus the bucket locks
/// that keep the hash body frozen until the caller has swapped it out.
pub struct Converted<'a, K: IndexKey> {
    /// Sorted leaves covering disjoint, ascending key ranges.
    pub parts: Vec<SortedLeaf<K>>,
    guards: Vec<LockGuard<'a>>,
}

impl<K: IndexKey> Converted<'_, K> {
    /// Move the partitions out, keeping the buckets locked.
    pub fn take_parts(&mut self) -> Vec<SortedLeaf<K>> {
        std::mem::take(&mut self.parts)
    }

    /// Release the bucket locks, marking every bucket obsolete.
    pub fn seal(self) {
        for guard in self.guards {
            guard.write_unlock_obsolete();
        }
    }
}

impl<K: IndexKey> HashLeaf<K> {
    /// Create a body with `nbuckets` empty buckets in `state`.
    #[must_use]
    pub fn new(nbuckets: usize, state: BucketState) -> Self {
        Self {
            buckets: (0..nbuckets).map(|_| Bucket::new(state)).collect(),
            partner: AtomicPtr::new(std::ptr::null_mut()),
            boundary: K::empty_slot(),
        }
    }

    /// Number of buckets.
    #[inline(always)]
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket `idx`.
    #[inline(always)]
    #[must_use]
    pub fn bucket(&self, idx: usize) -> &Bucket<K> {
        &self.buckets[idx]
    }

    /// Live entries in bucket order (not sorted). Single-threaded or locked use.
    pub fn entries(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        self.buckets.iter().flat_map(Bucket::entries)
    }

    /// Entries this body logically owns, honouring unsettled pairs: a
    /// left-linked bucket gives up keys above the boundary and a
    /// right-linked bucket claims them from its partner. Unsorted.
    /// Single-threaded or locked use.
    #[must_use]
    pub fn logical_entries(&self) -> Vec<(K, u64)> {
        let boundary: K = self.boundary();
        let mut all: Vec<(K, u64)> = Vec::with_capacity(self.len());

        for (idx, bucket) in self.buckets.iter().enumerate() {
            match bucket.state() {
                BucketState::Stable => all.extend(bucket.entries()),
                BucketState::LinkedLeft => {
                    all.extend(bucket.entries().filter(|(k, _)| *k <= boundary));
                }
                BucketState::LinkedRight => {
                    all.extend(bucket.entries());
                    if let Some(partner) = self.partner() {
                        all.extend(
                            partner.buckets[idx]
                                .entries()
                                .filter(|(k, _)| *k > boundary),
                        );
                    }
                }
            }
        }

        all
    }

    /// Number of live entries (optimistic estimate under concurrency).
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// True when no bucket holds an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// True when some pair is still unsettled.
    #[must_use]
    pub fn has_linked(&self) -> bool {
        self.buckets
            .iter()
            .any(|b| b.state() != BucketState::Stable)
    }

    /// True once a split has paired this body with another.
    #[must_use]
    pub(crate) fn has_partner(&self) -> bool {
        !self.partner.load(READ_ORD).is_null()
    }

    #[inline]
    fn boundary(&self) -> K {
        K::load(&self.boundary)
    }

    #[inline]
    fn partner(&self) -> Option<&Self> {
        let ptr: *mut Self = self.partner.load(READ_ORD);

        // SAFETY: a partner is set before any bucket is linked and stays
        // live while a linked pair exists (splits and conversions settle
        // every pair before re-linking or retiring a body). The caller's
        // reclamation guard covers a reader racing with that settlement.
        unsafe { ptr.as_ref() }
    }

    // ========================================================================
    //  Settlement
    // ========================================================================

    /// Settle pair `idx`. Caller holds this body's bucket `idx` lock.
    ///
    /// # Errors
    /// [`Restart`] if the partner bucket is locked.
    fn settle_pair(&self, idx: usize) -> Result<(), Restart> {
        let own: &Bucket<K> = &self.buckets[idx];
        let state: BucketState = own.state();

        if state == BucketState::Stable {
            return Ok(());
        }

        let Some(partner) = self.partner() else {
            debug_assert!(false, "settle_pair: linked bucket without partner");
            own.set_state(BucketState::Stable);
            return Ok(());
        };

        let other: &Bucket<K> = &partner.buckets[idx];
        let _other_guard: LockGuard<'_> = other.version().try_writelock().ok_or(Restart)?;

        let boundary: K = self.boundary();
        match state {
            BucketState::LinkedLeft => settle(own, other, &boundary),
            _ => settle(other, own, &boundary),
        };

        Ok(())
    }

    // ========================================================================
    //  Point operations
    // ========================================================================

    /// Read bucket `idx` (and its left partner if unsettled).
    fn read_bucket(&self, idx: usize, key: &K, fp: u8) -> Result<Option<u64>, Restart> {
        let bucket: &Bucket<K> = &self.buckets[idx];
        let snapshot: u64 = bucket.version().read_snapshot()?;

        let mut found: Option<u64> = None;

        if bucket.state() == BucketState::LinkedRight {
            if let Some(partner) = self.partner() {
                let other: &Bucket<K> = &partner.buckets[idx];
                let other_snapshot: u64 = other.version().read_snapshot()?;
                found = other.get(key, fp);
                other.version().validate(other_snapshot)?;
            }
        }

        if found.is_none() {
            found = bucket.get(key, fp);
        }

        bucket.version().validate(snapshot)?;
        Ok(found)
    }

    /// Optimistic point lookup against node snapshot `node_version`.
    ///
    /// # Errors
    /// [`Restart`] on any failed validation.
    pub fn lookup(&self, key: &K, node: &VersionedLock, node_version: u64) -> Result<Option<u64>, Restart> {
        let fp: u8 = fingerprint(key);

        for idx in candidates(key, self.bucket_count()) {
            if let Some(value) = self.read_bucket(idx, key, fp)? {
                node.validate(node_version)?;
                return Ok(Some(value));
            }
        }

        node.validate(node_version)?;
        Ok(None)
    }

    /// Lock every distinct candidate bucket, validate the node snapshot and
    /// settle the locked buckets.
    fn lock_candidates(
        &self,
        cands: &[usize; CANDIDATES],
        node: &VersionedLock,
        node_version: u64,
    ) -> Result<CandidateLocks<'_>, Restart> {
        let (order, len) = lock_order(cands);
        let mut guards: CandidateLocks<'_> = std::array::from_fn(|_| None);

        for (slot, &idx) in guards.iter_mut().zip(&order[..len]) {
            *slot = Some(self.buckets[idx].version().try_writelock().ok_or(Restart)?);
        }

        node.validate(node_version)?;

        for &idx in &order[..len] {
            self.settle_pair(idx)?;
        }

        Ok(guards)
    }

    /// Slot of `key` among its candidate buckets.
    fn locate(&self, cands: &[usize; CANDIDATES], key: &K, fp: u8) -> Option<(usize, usize)> {
        cands
            .iter()
            .find_map(|&idx| self.buckets[idx].find(key, fp).map(|slot| (idx, slot)))
    }

    /// Insert or overwrite `key` without the node lock.
    ///
    /// # Errors
    /// [`Restart`] if a bucket lock is busy or the node changed.
    pub fn insert(
        &self,
        key: K,
        value: u64,
        node: &VersionedLock,
        node_version: u64,
    ) -> Result<LeafInsert, Restart> {
        let fp: u8 = fingerprint(&key);
        let cands: [usize; CANDIDATES] = candidates(&key, self.bucket_count());
        let _locks: CandidateLocks<'_> = self.lock_candidates(&cands, node, node_version)?;

        Ok(self.upsert_locked(&cands, key, fp, value))
    }

    /// Upsert with every candidate bucket locked and settled.
    fn upsert_locked(&self, cands: &[usize; CANDIDATES], key: K, fp: u8, value: u64) -> LeafInsert {
        if let Some((idx, slot)) = self.locate(cands, &key, fp) {
            return LeafInsert::Success(Some(self.buckets[idx].replace_value(slot, value)));
        }

        for &idx in cands {
            if self.buckets[idx].try_insert(key, fp, value) {
                return LeafInsert::Success(None);
            }
        }

        LeafInsert::NeedsSplit
    }

    /// Overwrite the value of an existing key.
    ///
    /// # Errors
    /// [`Restart`] if a bucket lock is busy or the node changed.
    pub fn update(&self, key: &K, value: u64, node: &VersionedLock, node_version: u64) -> Result<bool, Restart> {
        let fp: u8 = fingerprint(key);
        let cands: [usize; CANDIDATES] = candidates(key, self.bucket_count());
        let _locks: CandidateLocks<'_> = self.lock_candidates(&cands, node, node_version)?;

        Ok(match self.locate(&cands, key, fp) {
            Some((idx, slot)) => {
                self.buckets[idx].replace_value(slot, value);
                true
            }
            None => false,
        })
    }

    /// Remove `key`, returning its value.
    ///
    /// # Errors
    /// [`Restart`] if a bucket lock is busy or the node changed.
    pub fn remove(&self, key: &K, node: &VersionedLock, node_version: u64) -> Result<Option<u64>, Restart> {
        let fp: u8 = fingerprint(key);
        let cands: [usize; CANDIDATES] = candidates(key, self.bucket_count());
        let _locks: CandidateLocks<'_> = self.lock_candidates(&cands, node, node_version)?;

        Ok(self
            .locate(&cands, key, fp)
            .map(|(idx, slot)| self.buckets[idx].clear(slot)))
    }

    /// Entries with key >= `min`, sorted, at most `limit`, read optimistically.
    ///
    /// Every bucket is read under its own snapshot; the node snapshot is
    /// validated last. Costs a full bucket sweep plus a sort.
    ///
    /// # Errors
    /// [`Restart`] on any failed validation.
    pub fn scan(
        &self,
        min: &K,
        limit: usize,
        out: &mut Vec<(K, u64)>,
        node: &VersionedLock,
        node_version: u64,
    ) -> Result<usize, Restart> {
        let mut found: Vec<(K, u64)> = Vec::new();

        let boundary: K = self.boundary();

        for (idx, bucket) in self.buckets.iter().enumerate() {
            let snapshot: u64 = bucket.version().read_snapshot()?;

            match bucket.state() {
                BucketState::Stable => {
                    found.extend(bucket.entries().filter(|(k, _)| k >= min));
                }
                // Entries above the boundary belong to the right partner.
                BucketState::LinkedLeft => {
                    found.extend(
                        bucket
                            .entries()
                            .filter(|(k, _)| k >= min && *k <= boundary),
                    );
                }
                BucketState::LinkedRight => {
                    found.extend(bucket.entries().filter(|(k, _)| k >= min));

                    if let Some(partner) = self.partner() {
                        let other: &Bucket<K> = &partner.buckets[idx];
                        let other_snapshot: u64 = other.version().read_snapshot()?;
                        found.extend(
                            other
                                .entries()
                                .filter(|(k, _)| k >= min && *k > boundary),
                        );
                        other.version().validate(other_snapshot)?;
                    }
                }
            }

            bucket.version().validate(snapshot)?;
        }

        node.validate(node_version)?;

        found.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let n: usize = found.len().min(limit);
        out.extend_from_slice(&found[..n]);
        Ok(n)
    }

    // ========================================================================
    //  Structural operations (caller holds the node lock)
    // ========================================================================

    /// Lock every bucket, waiting briefly for in-flight point writers.
    fn drain(&self) -> Result<Vec<LockGuard<'_>>, Restart> {
        self.buckets
            .iter()
            .map(|b| b.version().writelock_bounded(DRAIN_BUDGET).ok_or(Restart))
            .collect()
    }

    /// Lock and settle every bucket.
    fn freeze(&self) -> Result<Vec<LockGuard<'_>>, Restart> {
        let guards: Vec<LockGuard<'_>> = self.drain()?;

        for idx in 0..self.bucket_count() {
            self.settle_pair(idx)?;
        }

        Ok(guards)
    }

    /// Choose the split key: the lower median of all keys, or of a sample.
    fn choose_split_key(&self, policy: MedianPolicy) -> Option<K> {
        let mut keys: Vec<K> = match policy {
            MedianPolicy::Exact => self.entries().map(|(k, _)| k).collect(),
            MedianPolicy::Sampled(size) => self.sample_keys(size),
        };

        if keys.len() < 2 {
            keys = self.entries().map(|(k, _)| k).collect();
        }

        if keys.is_empty() {
            return None;
        }

        let mid: usize = (keys.len() - 1) / 2;
        let (_, median, _) = keys.select_nth_unstable(mid);
        Some(*median)
    }

    /// Keys of consecutive buckets starting at a random one, until `size`
    /// keys are gathered. Hash placement makes that a uniform sample.
    fn sample_keys(&self, size: usize) -> Vec<K> {
        let n: usize = self.bucket_count();
        let start: usize = rand::rng().random_range(0..n);
        let mut keys: Vec<K> = Vec::with_capacity(size + crate::config::BUCKET_SLOTS);

        for step in 0..n {
            if keys.len() >= size {
                break;
            }
            keys.extend(self.buckets[(start + step) % n].entries().map(|(k, _)| k));
        }

        keys
    }

    /// Split this body around a median key and place the pending entry.
    ///
    /// Every bucket is drained and settled first. Failure to lock any bucket
    /// (in this body or a partner) abandons the split without side effects.
    ///
    /// # Errors
    /// [`Restart`] if a bucket lock could not be taken.
    pub fn split(&self, key: K, value: u64, policy: MedianPolicy) -> Result<HashSplit<K>, Restart> {
        let _guards: Vec<LockGuard<'_>> = self.freeze()?;
        let split_key: K = self.choose_split_key(policy).ok_or(Restart)?;

        let right_body: Box<LeafBody<K>> = Box::new(LeafBody::Hash(Self::new(
            self.bucket_count(),
            BucketState::LinkedRight,
        )));
        let LeafBody::Hash(right) = right_body.as_ref() else {
            return Err(Restart);
        };

        right
            .partner
            .store(std::ptr::from_ref(self).cast_mut(), WRITE_ORD);
        K::store(&right.boundary, split_key);

        K::store(&self.boundary, split_key);
        self.partner
            .store(std::ptr::from_ref(right).cast_mut(), WRITE_ORD);
        for bucket in &self.buckets {
            bucket.set_state(BucketState::LinkedLeft);
        }

        // The right body is private: settle the pending key's pairs directly
        // so its candidate buckets are exact on both sides.
        let fp: u8 = fingerprint(&key);
        let cands: [usize; CANDIDATES] = candidates(&key, self.bucket_count());
        for &idx in &cands {
            if self.buckets[idx].state() != BucketState::Stable {
                settle(&self.buckets[idx], &right.buckets[idx], &split_key);
            }
        }

        let side: &Self = if key <= split_key { self } else { right };
        let pending: PendingInsert = match side.upsert_locked(&cands, key, fp, value) {
            LeafInsert::Success(old) => PendingInsert::Inserted(old),
            LeafInsert::NeedsSplit => PendingInsert::Full,
        };

        Ok(HashSplit {
            split_key,
            right: right_body,
            pending,
        })
    }

    /// Freeze this body and build sorted leaves from its entries.
    ///
    /// Each part holds `batch` entries (the last one possibly fewer) in a
    /// leaf of capacity `width`. An empty body yields one empty part.
    ///
    /// # Errors
    /// [`Restart`] if a bucket lock could not be taken.
    pub fn convert(&self, batch: usize, width: usize) -> Result<Converted<'_, K>, Restart> {
        let guards: Vec<LockGuard<'_>> = self.freeze()?;

        let mut entries: Vec<(K, u64)> = self.entries().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let parts: Vec<SortedLeaf<K>> = if entries.is_empty() {
            vec![SortedLeaf::new(width)]
        } else {
            entries
                .chunks(batch.max(1))
                .map(|chunk| SortedLeaf::from_sorted(width, chunk))
                .collect()
        };

        Ok(Converted { parts, guards })
    }
}

impl<K: IndexKey> std::fmt::Debug for HashLeaf<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashLeaf")
            .field("buckets", &self.bucket_count())
            .field("len", &self.len())
            .field("linked", &self.has_linked())
            .finish_non_exhaustive()
    }
}
