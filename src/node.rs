//! Filepath: src/node.rs
//!
//! Header shared by every tree node.
//!
//! Leaves and inner nodes are `#[repr(C)]` with a [`NodeHeader`] as their
//! first field, so a `*mut NodeHeader<K>` addresses either kind. The header's
//! `level` (0 for leaves) tells which one it is.

use std::sync::atomic::AtomicPtr;

use crate::key::{HighKey, IndexKey};
use crate::nodeversion::VersionedLock;
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Type-erased pointer to a leaf or inner node.
pub type NodePtr<K> = *mut NodeHeader<K>;

/// Version lock, level, right sibling and high key of a node.
#[repr(C)]
pub struct NodeHeader<K: IndexKey> {
    version: VersionedLock,
    level: u32,
    sibling: AtomicPtr<NodeHeader<K>>,
    high_key: HighKey<K>,
}

impl<K: IndexKey> NodeHeader<K> {
    /// Create a header. The node starts unlocked.
    #[must_use]
    pub fn new(level: u32, sibling: NodePtr<K>, high_key: Option<K>) -> Self {
        Self {
            version: VersionedLock::new(),
            level,
            sibling: AtomicPtr::new(sibling),
            high_key: HighKey::new(high_key),
        }
    }

    /// The node's lock.
    #[inline(always)]
    #[must_use]
    pub const fn version(&self) -> &VersionedLock {
        &self.version
    }

    /// 0 for leaves; parents are one above their children.
    #[inline(always)]
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// True for level-0 nodes.
    #[inline(always)]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Right neighbour on the same level, or null.
    #[inline(always)]
    #[must_use]
    pub fn sibling(&self) -> NodePtr<K> {
        self.sibling.load(READ_ORD)
    }

    /// Caller holds the write lock.
    #[inline(always)]
    pub fn set_sibling(&self, sibling: NodePtr<K>) {
        self.sibling.store(sibling, WRITE_ORD);
    }

    /// Inclusive upper bound, `None` on the rightmost node of a level.
    #[inline(always)]
    #[must_use]
    pub fn high_key(&self) -> Option<K> {
        self.high_key.load()
    }

    /// Caller holds the write lock.
    #[inline(always)]
    pub fn set_high_key(&self, high_key: Option<K>) {
        self.high_key.store(high_key);
    }

    /// Whether `key` is beyond this node's range (move right).
    #[inline(always)]
    #[must_use]
    pub fn must_move_right(&self, key: &K) -> bool {
        self.high_key.is_exceeded_by(key)
    }

    /// Splice `right` in as this node's new sibling, taking over the upper
    /// part of the range from `split_key`. Caller holds this node's lock
    /// and `right` is not yet reachable.
    pub fn link_right(&self, right: &Self, split_key: K) {
        debug_assert_eq!(self.level, right.level, "link_right: level mismatch");
        right.set_sibling(self.sibling());
        right.set_high_key(self.high_key());
        self.set_sibling(std::ptr::from_ref(right).cast_mut());
        self.set_high_key(Some(split_key));
    }
}

impl<K: IndexKey> std::fmt::Debug for NodeHeader<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHeader")
            .field("level", &self.level)
            .field("version", &self.version.value())
            .field("sibling", &self.sibling())
            .field("high_key", &self.high_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_right_transfers_range() {
        let left: NodeHeader<u64> = NodeHeader::new(0, std::ptr::null_mut(), Some(100));
        let right: NodeHeader<u64> = NodeHeader::new(0, std::ptr::null_mut(), None);

        left.link_right(&right, 50);

        assert_eq!(left.high_key(), Some(50));
        assert_eq!(right.high_key(), Some(100));
        assert_eq!(left.sibling(), std::ptr::from_ref(&right).cast_mut());
        assert!(right.sibling().is_null());
        assert!(left.must_move_right(&51));
        assert!(!left.must_move_right(&50));
    }

    #[test]
    fn test_leaf_level() {
        let leaf: NodeHeader<u64> = NodeHeader::new(0, std::ptr::null_mut(), None);
        let inner: NodeHeader<u64> = NodeHeader::new(2, std::ptr::null_mut(), None);
        assert!(leaf.is_leaf());
        assert!(!inner.is_leaf());
        assert_eq!(inner.level(), 2);
    }
}
