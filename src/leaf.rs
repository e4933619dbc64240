//! Filepath: src/leaf.rs
//!
//! Leaf nodes.
//!
//! A [`LeafNode`] is a shell: the shared [`NodeHeader`] plus a pointer to its
//! [`LeafBody`]. The body is either a [`HashLeaf`] or a [`SortedLeaf`].
//! Conversion swaps the body of the same node, so the left neighbour's
//! sibling pointer and the parent's child pointer stay valid across it.
//!
//! # Submodules
//!
//! - [`hash`]: bucketed leaf with lazy split settlement
//! - [`sorted`]: ordered array leaf

pub mod hash;
pub mod sorted;

use std::sync::atomic::AtomicPtr;

use crate::key::IndexKey;
use crate::node::{NodeHeader, NodePtr};
use crate::nodeversion::{Restart, VersionedLock};
use crate::ordering::{READ_ORD, WRITE_ORD};

pub use hash::HashLeaf;
pub use sorted::SortedLeaf;

// ============================================================================
//  Outcomes
// ============================================================================

/// Outcome of a leaf insert that did not need a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafInsert {
    /// Written. Holds the previous value when the key already existed.
    Success(Option<u64>),

    /// No room: the leaf must split first.
    NeedsSplit,
}

/// Outcome of a leaf range scan that did not need a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum LeafScan {
    /// This many entries were appended.
    Done(usize),

    /// The leaf is a hash leaf: convert it, then restart the scan.
    NeedsConversion,
}

// ============================================================================
//  LeafBody
// ============================================================================

/// The two leaf representations.
#[derive(Debug)]
pub enum LeafBody<K: IndexKey> {
    /// Unordered buckets: fast point operations.
    Hash(HashLeaf<K>),

    /// Sorted array: cheap range scans.
    Sorted(SortedLeaf<K>),
}

impl<K: IndexKey> LeafBody<K> {
    /// True for the hash representation.
    #[inline(always)]
    #[must_use]
    pub const fn is_hash(&self) -> bool {
        matches!(self, Self::Hash(_))
    }

    /// Live entries. Unsorted for hash bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Hash(h) => h.len(),
            Self::Sorted(s) => s.len(),
        }
    }

    /// True when the body holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries sorted by key. For diagnostics; not synchronized.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<(K, u64)> {
        match self {
            Self::Hash(h) => {
                let mut all: Vec<(K, u64)> = h.logical_entries();
                all.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                all
            }
            Self::Sorted(s) => s.entries().collect(),
        }
    }

    /// Optimistic range read against node snapshot `node_version`.
    ///
    /// Hash bodies either ask for conversion or, when `convert` is false,
    /// sort their own entries in place of an ordered read.
    ///
    /// # Errors
    /// [`Restart`] on any failed validation. On error `out` is left as it was.
    pub fn range_lookup(
        &self,
        min: &K,
        limit: usize,
        out: &mut Vec<(K, u64)>,
        node: &VersionedLock,
        node_version: u64,
        convert: bool,
    ) -> Result<LeafScan, Restart> {
        match self {
            Self::Hash(_) if convert => Ok(LeafScan::NeedsConversion),
            Self::Hash(h) => Ok(LeafScan::Done(h.scan(min, limit, out, node, node_version)?)),
            Self::Sorted(s) => {
                let start: usize = out.len();
                let n: usize = s.scan(min, limit, out);

                if node.validate(node_version).is_err() {
                    out.truncate(start);
                    return Err(Restart);
                }

                Ok(LeafScan::Done(n))
            }
        }
    }
}

// ============================================================================
//  LeafNode
// ============================================================================

/// Leaf shell: header plus swappable body.
#[repr(C)]
pub struct LeafNode<K: IndexKey> {
    header: NodeHeader<K>,
    body: AtomicPtr<LeafBody<K>>,
}

impl<K: IndexKey> LeafNode<K> {
    /// Create a leaf owning `body`.
    #[must_use]
    pub fn new(body: Box<LeafBody<K>>, sibling: NodePtr<K>, high_key: Option<K>) -> Self {
        Self {
            header: NodeHeader::new(0, sibling, high_key),
            body: AtomicPtr::new(Box::into_raw(body)),
        }
    }

    /// Shared header.
    #[inline(always)]
    #[must_use]
    pub const fn header(&self) -> &NodeHeader<K> {
        &self.header
    }

    /// Raw body pointer.
    #[inline(always)]
    #[must_use]
    pub fn body_ptr(&self) -> *mut LeafBody<K> {
        self.body.load(READ_ORD)
    }

    /// Current body.
    ///
    /// The reference stays valid while the caller's reclamation guard is
    /// held; bodies are only replaced by conversion, which retires the old
    /// one through the collector.
    #[inline(always)]
    #[must_use]
    pub fn body(&self) -> &LeafBody<K> {
        // SAFETY: the body pointer is never null and is only freed through
        // deferred reclamation or teardown.
        unsafe { &*self.body_ptr() }
    }

    /// Install a new body, returning the old pointer for retirement.
    /// Caller holds the node lock.
    #[must_use = "the old body must be retired"]
    pub fn swap_body(&self, body: Box<LeafBody<K>>) -> *mut LeafBody<K> {
        self.body.swap(Box::into_raw(body), WRITE_ORD)
    }
}

impl<K: IndexKey> std::fmt::Debug for LeafNode<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafNode")
            .field("header", &self.header)
            .field("body", self.body())
            .finish()
    }
}

impl<K: IndexKey> Drop for LeafNode<K> {
    fn drop(&mut self) {
        let body: *mut LeafBody<K> = *self.body.get_mut();

        // SAFETY: the node owns its current body, allocated by Box::into_raw.
        // A node is dropped only at teardown, after every operation ended.
        unsafe { drop(Box::from_raw(body)) };
    }
}
