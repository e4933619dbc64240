//! Operation counters and structural statistics.

use std::sync::atomic::AtomicU64;

use crate::alloc::{as_inner, as_leaf, header};
use crate::config::TreeConfig;
use crate::key::IndexKey;
use crate::leaf::LeafBody;
use crate::node::NodePtr;
use crate::ordering::RELAXED;

use super::BlinkHash;

/// Live counters, bumped with relaxed atomics.
#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) restarts: AtomicU64,
    pub(super) leaf_splits: AtomicU64,
    pub(super) inner_splits: AtomicU64,
    pub(super) root_growths: AtomicU64,
    pub(super) conversions: AtomicU64,
}

/// Snapshot of the tree's operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    /// Attempts abandoned after a failed validation or lock and retried.
    pub restarts: u64,

    /// Leaf splits (hash or sorted).
    pub leaf_splits: u64,

    /// Inner nodes created by splitting or batch insertion.
    pub inner_splits: u64,

    /// Levels added on top of the root.
    pub root_growths: u64,

    /// Hash leaves converted to sorted leaves.
    pub conversions: u64,
}

/// Structural statistics gathered by walking every level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TreeStats {
    /// Levels, leaves included.
    pub height: usize,

    /// Inner nodes on all levels.
    pub inner_nodes: usize,

    /// Leaves with a hash body.
    pub hash_leaves: usize,

    /// Leaves with a sorted body.
    pub sorted_leaves: usize,

    /// Entries found in the leaves.
    pub entries: usize,

    /// Entries over total leaf slot capacity.
    pub leaf_fill: f64,
}

impl Counters {
    pub(super) fn snapshot(&self) -> OpCounters {
        OpCounters {
            restarts: self.restarts.load(RELAXED),
            leaf_splits: self.leaf_splits.load(RELAXED),
            inner_splits: self.inner_splits.load(RELAXED),
            root_growths: self.root_growths.load(RELAXED),
            conversions: self.conversions.load(RELAXED),
        }
    }
}

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Operation counters accumulated since creation.
    #[must_use]
    pub fn counters(&self) -> OpCounters {
        self.counters.snapshot()
    }

    /// Walk the tree and count nodes and entries.
    ///
    /// Meant for quiescent trees; under concurrent writes the numbers are
    /// approximate.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "fill ratio is approximate")]
    pub fn stats(&self) -> TreeStats {
        let _guard = self.guard();
        let mut stats: TreeStats = TreeStats {
            height: self.height(),
            ..TreeStats::default()
        };
        let mut capacity: usize = 0;

        let mut level_start: NodePtr<K> = self.load_root();
        while !level_start.is_null() {
            // SAFETY: nodes are never freed while the tree is alive.
            let is_leaf: bool = unsafe { header(level_start).is_leaf() };
            let mut node: NodePtr<K> = level_start;

            while !node.is_null() {
                // SAFETY: as above; the level decides the node type.
                unsafe {
                    if is_leaf {
                        match as_leaf(node).body() {
                            LeafBody::Hash(h) => {
                                stats.hash_leaves += 1;
                                stats.entries += h.logical_entries().len();
                                capacity += h.bucket_count() * crate::config::BUCKET_SLOTS;
                            }
                            LeafBody::Sorted(s) => {
                                stats.sorted_leaves += 1;
                                stats.entries += s.len();
                                capacity += s.capacity();
                            }
                        }
                    } else {
                        stats.inner_nodes += 1;
                    }
                    node = header(node).sibling();
                }
            }

            // SAFETY: as above.
            level_start = if is_leaf {
                std::ptr::null_mut()
            } else {
                unsafe { as_inner(level_start).leftmost() }
            };
        }

        if capacity > 0 {
            stats.leaf_fill = stats.entries as f64 / capacity as f64;
        }
        stats
    }
}
