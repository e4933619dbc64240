//! Writes: insert, update, remove.
//!
//! Hash leaves take only bucket locks for point writes and validate the
//! node snapshot while holding them, so a write never lands in a body that
//! a split or conversion has frozen. Sorted leaves are written under the
//! node lock. Splits lock the leaf, publish the right half through the
//! sibling chain, then hand the still-locked leaf to propagation.

use seize::LocalGuard;

use crate::alloc::{alloc_leaf, as_leaf, header};
use crate::config::TreeConfig;
use crate::key::IndexKey;
use crate::leaf::hash::{HashSplit, PendingInsert};
use crate::leaf::{HashLeaf, LeafBody, LeafInsert, LeafNode, SortedLeaf};
use crate::node::NodePtr;
use crate::nodeversion::{LockGuard, Restart, VersionedLock};
use crate::ordering::RELAXED;
use crate::tracing_helpers::{debug_log, warn_log};

use super::BlinkHash;

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// One insert attempt.
    pub(super) fn try_insert(&self, key: K, value: u64, _guard: &LocalGuard<'_>) -> Result<Option<u64>, Restart> {
        let mut stack: Vec<NodePtr<K>> = Vec::new();
        let (node, version) = self.descend(&key, 0, Some(&mut stack))?;
        // SAFETY: level 0 node; nodes live as long as the tree.
        let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
        let lock: &VersionedLock = leaf.header().version();

        let written: Option<u64> = match leaf.body() {
            LeafBody::Hash(h) => match h.insert(key, value, lock, version)? {
                LeafInsert::Success(old) => old,
                LeafInsert::NeedsSplit => {
                    let node_guard: LockGuard<'_> = lock.try_upgrade_writelock(version).ok_or(Restart)?;
                    return self.split_hash_leaf(stack, node_guard, node, h, key, value);
                }
            },
            LeafBody::Sorted(s) => {
                let node_guard: LockGuard<'_> = lock.try_upgrade_writelock(version).ok_or(Restart)?;
                match s.insert(key, value) {
                    LeafInsert::Success(old) => old,
                    LeafInsert::NeedsSplit => {
                        return self.split_sorted_leaf(stack, node_guard, node, s, key, value);
                    }
                }
            }
        };

        self.note_written(written);
        Ok(written)
    }

    /// One update attempt.
    pub(super) fn try_update(&self, key: &K, value: u64) -> Result<bool, Restart> {
        let (node, version) = self.descend(key, 0, None)?;
        // SAFETY: level 0 node; nodes live as long as the tree.
        let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
        let lock: &VersionedLock = leaf.header().version();

        match leaf.body() {
            LeafBody::Hash(h) => h.update(key, value, lock, version),
            LeafBody::Sorted(s) => {
                let _node_guard: LockGuard<'_> = lock.try_upgrade_writelock(version).ok_or(Restart)?;
                Ok(s.update(key, value))
            }
        }
    }

    /// One remove attempt.
    pub(super) fn try_remove(&self, key: &K) -> Result<Option<u64>, Restart> {
        let (node, version) = self.descend(key, 0, None)?;
        // SAFETY: level 0 node; nodes live as long as the tree.
        let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
        let lock: &VersionedLock = leaf.header().version();

        let removed: Option<u64> = match leaf.body() {
            LeafBody::Hash(h) => h.remove(key, lock, version)?,
            LeafBody::Sorted(s) => {
                let _node_guard: LockGuard<'_> = lock.try_upgrade_writelock(version).ok_or(Restart)?;
                s.remove(key)
            }
        };

        if removed.is_some() {
            self.count.fetch_sub(1, RELAXED);
        }
        Ok(removed)
    }

    #[inline]
    fn note_written(&self, old: Option<u64>) {
        if old.is_none() {
            self.count.fetch_add(1, RELAXED);
        }
    }

    // ========================================================================
    //  Leaf splits
    // ========================================================================

    /// Split a full hash leaf (locked by `node_guard`) and place the key.
    fn split_hash_leaf<'n>(
        &self,
        stack: Vec<NodePtr<K>>,
        node_guard: LockGuard<'n>,
        node: NodePtr<K>,
        body: &HashLeaf<K>,
        key: K,
        value: u64,
    ) -> Result<Option<u64>, Restart> {
        let split: HashSplit<K> = match body.split(key, value, C::MEDIAN) {
            Ok(split) => split,
            Err(Restart) => {
                warn_log!("hash leaf split abandoned: bucket writers did not drain");
                return Err(Restart);
            }
        };

        let right: NodePtr<K> = alloc_leaf(split.right, std::ptr::null_mut(), None);
        // SAFETY: `node` is locked by us; `right` is private until linked.
        unsafe { header(node).link_right(header(right), split.split_key) };
        Self::bump(&self.counters.leaf_splits);
        debug_log!(split_key = ?split.split_key, "hash leaf split");

        self.propagate(stack, node_guard, node, vec![(split.split_key, right)]);

        match split.pending {
            PendingInsert::Inserted(old) => {
                self.note_written(old);
                Ok(old)
            }
            // Published without the key; the next attempt finds room.
            PendingInsert::Full => Err(Restart),
        }
    }

    /// Split a full sorted leaf (locked by `node_guard`) and place the key.
    fn split_sorted_leaf<'n>(
        &self,
        stack: Vec<NodePtr<K>>,
        node_guard: LockGuard<'n>,
        node: NodePtr<K>,
        body: &SortedLeaf<K>,
        key: K,
        value: u64,
    ) -> Result<Option<u64>, Restart> {
        let (split_key, right_body) = body.split();
        let target: &SortedLeaf<K> = if key <= split_key { body } else { &right_body };
        let placed: LeafInsert = target.insert(key, value);

        let right: NodePtr<K> = alloc_leaf(
            Box::new(LeafBody::Sorted(right_body)),
            std::ptr::null_mut(),
            None,
        );
        // SAFETY: `node` is locked by us; `right` is private until linked.
        unsafe { header(node).link_right(header(right), split_key) };
        Self::bump(&self.counters.leaf_splits);
        debug_log!(split_key = ?split_key, "sorted leaf split");

        self.propagate(stack, node_guard, node, vec![(split_key, right)]);

        match placed {
            LeafInsert::Success(old) => {
                self.note_written(old);
                Ok(old)
            }
            LeafInsert::NeedsSplit => Err(Restart),
        }
    }
}
