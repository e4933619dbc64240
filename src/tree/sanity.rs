//! Structural invariant checker for quiescent trees.
//!
//! Used by tests after concurrent phases have joined. Every level is walked
//! along its sibling chain and checked against the level below.

use std::fmt as StdFmt;

use crate::alloc::{as_inner, as_leaf, header};
use crate::config::TreeConfig;
use crate::internode::InnerNode;
use crate::key::IndexKey;
use crate::leaf::LeafBody;
use crate::node::NodePtr;

use super::{BlinkHash, TreeStats};

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node sits on the wrong level.
    LevelMismatch {
        /// Level the walk expected.
        expected: u32,
        /// Level the node reports.
        found: u32,
    },

    /// Keys inside a node are not strictly ascending.
    UnsortedNode {
        /// Level of the node.
        level: u32,
    },

    /// A key lies outside its node's `(low, high]` range.
    KeyOutOfRange {
        /// Level of the node.
        level: u32,
        /// The offending key, formatted.
        key: String,
    },

    /// The children of a level, read left to right, differ from the
    /// sibling chain of the level below.
    ChildChainMismatch {
        /// Level of the parents.
        level: u32,
    },

    /// A child's high key differs from the separator to its right.
    ChildBoundMismatch {
        /// Level of the parent.
        level: u32,
    },

    /// The rightmost node of a level has a high key, or another node lacks
    /// one.
    BadRightEdge {
        /// Level of the node.
        level: u32,
    },

    /// A hash leaf still has unsettled pairs whose partner is gone.
    DanglingLink,

    /// The entry counter disagrees with the leaves.
    CountMismatch {
        /// Value of the counter.
        counted: usize,
        /// Entries found in leaves.
        found: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::LevelMismatch { expected, found } => {
                write!(f, "node on level {found}, expected {expected}")
            }
            Self::UnsortedNode { level } => write!(f, "unsorted keys in a node on level {level}"),
            Self::KeyOutOfRange { level, key } => {
                write!(f, "key {key} outside its node's range on level {level}")
            }
            Self::ChildChainMismatch { level } => {
                write!(f, "children of level {level} differ from the sibling chain below")
            }
            Self::ChildBoundMismatch { level } => {
                write!(f, "child high key differs from its separator on level {level}")
            }
            Self::BadRightEdge { level } => write!(f, "bad high key at the edge of level {level}"),
            Self::DanglingLink => write!(f, "unsettled hash bucket without partner"),
            Self::CountMismatch { counted, found } => {
                write!(f, "counter says {counted} entries, leaves hold {found}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Walk the whole tree and verify its structure.
    ///
    /// Checks per level: node levels, key order inside nodes, keys within
    /// `(low, high]`, high keys only missing on the rightmost node, and that
    /// parents list exactly the sibling chain below with matching bounds.
    /// Leaves must hold strictly ascending keys across the chain, and their
    /// total must equal [`Self::len`].
    ///
    /// Only meaningful when no operation is in flight.
    ///
    /// # Errors
    /// The first violation found.
    pub fn check_invariants(&self) -> Result<TreeStats, InvariantViolation> {
        let _guard = self.guard();
        let root: NodePtr<K> = self.load_root();
        // SAFETY: nodes live as long as the tree.
        let mut level: u32 = unsafe { header(root) }.level();
        let mut level_start: NodePtr<K> = root;

        loop {
            let chain: Vec<NodePtr<K>> = Self::check_chain(level_start, level)?;

            if level == 0 {
                let found: usize = Self::check_leaves(&chain)?;
                if found != self.len() {
                    return Err(InvariantViolation::CountMismatch {
                        counted: self.len(),
                        found,
                    });
                }
                break;
            }

            // SAFETY: level >= 1.
            level_start = unsafe { as_inner(level_start) }.leftmost();
            Self::check_children(&chain, level, level_start)?;
            level -= 1;
        }

        Ok(self.stats())
    }

    /// Sibling chain of one level, checking levels and right edges.
    fn check_chain(start: NodePtr<K>, level: u32) -> Result<Vec<NodePtr<K>>, InvariantViolation> {
        let mut chain: Vec<NodePtr<K>> = Vec::new();
        let mut node: NodePtr<K> = start;

        while !node.is_null() {
            // SAFETY: nodes live as long as the tree.
            let hdr = unsafe { header(node) };
            if hdr.level() != level {
                return Err(InvariantViolation::LevelMismatch {
                    expected: level,
                    found: hdr.level(),
                });
            }
            if hdr.sibling().is_null() != hdr.high_key().is_none() {
                return Err(InvariantViolation::BadRightEdge { level });
            }
            chain.push(node);
            node = hdr.sibling();
        }

        Ok(chain)
    }

    /// Inner nodes of one level against the level below.
    fn check_children(chain: &[NodePtr<K>], level: u32, below: NodePtr<K>) -> Result<(), InvariantViolation> {
        let mut expected: NodePtr<K> = below;
        let mut low: Option<K> = None;

        for &ptr in chain {
            // SAFETY: level >= 1; nodes live as long as the tree.
            let node: &InnerNode<K> = unsafe { as_inner(ptr) };
            let high: Option<K> = node.header().high_key();
            let entries: Vec<(K, NodePtr<K>)> = node.entries();

            if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
                return Err(InvariantViolation::UnsortedNode { level });
            }
            for &(key, _) in &entries {
                if low.is_some_and(|low| key <= low) || high.is_some_and(|high| key > high) {
                    return Err(InvariantViolation::KeyOutOfRange {
                        level,
                        key: format!("{key:?}"),
                    });
                }
            }

            // Bounds each child must carry: the next separator, then the
            // node's own high key.
            let bounds = entries.iter().map(|&(key, _)| Some(key)).chain(std::iter::once(high));
            for (child, bound) in node.children().zip(bounds) {
                if child != expected {
                    return Err(InvariantViolation::ChildChainMismatch { level });
                }
                // SAFETY: as above.
                let child_hdr = unsafe { header(child) };
                if child_hdr.high_key() != bound {
                    return Err(InvariantViolation::ChildBoundMismatch { level });
                }
                expected = child_hdr.sibling();
            }

            low = high;
        }

        if expected.is_null() {
            Ok(())
        } else {
            Err(InvariantViolation::ChildChainMismatch { level })
        }
    }

    /// Leaf chain: sorted, in range, settled links. Returns the entry total.
    fn check_leaves(chain: &[NodePtr<K>]) -> Result<usize, InvariantViolation> {
        let mut total: usize = 0;
        let mut low: Option<K> = None;
        let mut previous: Option<K> = None;

        for &ptr in chain {
            // SAFETY: leaf level; nodes live as long as the tree.
            let leaf = unsafe { as_leaf(ptr) };
            let high: Option<K> = leaf.header().high_key();

            let entries: Vec<(K, u64)> = match leaf.body() {
                LeafBody::Sorted(s) => {
                    let entries: Vec<(K, u64)> = s.entries().collect();
                    if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
                        return Err(InvariantViolation::UnsortedNode { level: 0 });
                    }
                    entries
                }
                LeafBody::Hash(h) => {
                    if h.has_linked() && !h.has_partner() {
                        return Err(InvariantViolation::DanglingLink);
                    }
                    leaf.body().sorted_entries()
                }
            };

            for &(key, _) in &entries {
                let out_of_range: bool = low.is_some_and(|low| key <= low)
                    || high.is_some_and(|high| key > high)
                    || previous.is_some_and(|prev| key <= prev);
                if out_of_range {
                    return Err(InvariantViolation::KeyOutOfRange {
                        level: 0,
                        key: format!("{key:?}"),
                    });
                }
                previous = Some(key);
            }

            total += entries.len();
            low = high;
        }

        Ok(total)
    }
}
