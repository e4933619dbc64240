//! Hash to sorted leaf conversion.
//!
//! The leaf is locked, its hash body frozen and partitioned into sorted
//! bodies. The first partition replaces the body of the same leaf node; the
//! others go into new leaf nodes chained to its right, whose separators are
//! then propagated like those of a split. The old body is retired through
//! the collector.

use seize::LocalGuard;

use crate::alloc::reclaim::retire_body;
use crate::alloc::{alloc_leaf, as_leaf, header};
use crate::config::TreeConfig;
use crate::key::IndexKey;
use crate::leaf::hash::Converted;
use crate::leaf::{LeafBody, LeafNode, SortedLeaf};
use crate::node::NodePtr;
use crate::nodeversion::{LockGuard, Restart};
use crate::tracing_helpers::debug_log;

use super::BlinkHash;

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Convert the hash leaf at `node`, whose snapshot is `version`.
    ///
    /// Returns false if the leaf is already sorted.
    ///
    /// # Errors
    /// [`Restart`] if the leaf changed since `version` or a bucket writer
    /// did not drain.
    pub(super) fn convert_leaf(
        &self,
        node: NodePtr<K>,
        version: u64,
        stack: Vec<NodePtr<K>>,
        guard: &LocalGuard<'_>,
    ) -> Result<bool, Restart> {
        // SAFETY: level 0 node; nodes live as long as the tree.
        let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
        let LeafBody::Hash(body) = leaf.body() else {
            return Ok(false);
        };

        let node_guard: LockGuard<'_> = leaf
            .header()
            .version()
            .try_upgrade_writelock(version)
            .ok_or(Restart)?;
        let mut converted: Converted<'_, K> = body.convert(C::sorted_batch(), C::SORTED_WIDTH)?;

        let mut parts = converted.take_parts().into_iter();
        let Some(first) = parts.next() else {
            return Err(Restart);
        };

        // Chain the remaining parts behind the leaf; each part's high key is
        // its largest key, the last one inherits the leaf's bound.
        let old_high: Option<K> = leaf.header().high_key();
        let old_sibling: NodePtr<K> = leaf.header().sibling();

        let mut separators: Vec<(K, NodePtr<K>)> = Vec::new();
        let mut tail: NodePtr<K> = node;
        let mut tail_max: Option<K> = last_key(&first);

        for part in parts {
            let part_max: Option<K> = last_key(&part);
            let fresh: NodePtr<K> = alloc_leaf(Box::new(LeafBody::Sorted(part)), std::ptr::null_mut(), None);

            if let Some(separator) = tail_max {
                // SAFETY: `tail` is the locked leaf or a node created above.
                unsafe {
                    header(tail).set_high_key(Some(separator));
                    header(tail).set_sibling(fresh);
                }
                separators.push((separator, fresh));
            }

            tail = fresh;
            tail_max = part_max;
        }

        // SAFETY: as above.
        unsafe {
            header(tail).set_high_key(old_high);
            header(tail).set_sibling(old_sibling);
        }

        let old_body: *mut LeafBody<K> = leaf.swap_body(Box::new(LeafBody::Sorted(first)));
        converted.seal();
        // SAFETY: swapped out above, so no new reader can reach it; retired once.
        unsafe { retire_body(guard, old_body) };

        Self::bump(&self.counters.conversions);
        debug_log!(parts = separators.len() + 1, "hash leaf converted");

        self.propagate(stack, node_guard, node, separators);
        Ok(true)
    }

    /// Convert every hash leaf to a sorted leaf. Returns how many were
    /// converted.
    pub fn convert_all(&self) -> usize {
        let guard: LocalGuard<'_> = self.guard();
        let mut converted: usize = 0;
        let mut node: NodePtr<K> = self.leftmost_leaf();

        while !node.is_null() {
            let done: bool = self.retry(|| {
                // SAFETY: nodes live as long as the tree.
                let version: u64 = unsafe { header(node) }.version().read_snapshot()?;
                self.convert_leaf(node, version, Vec::new(), &guard)
            });
            converted += usize::from(done);

            // SAFETY: as above.
            node = unsafe { header(node) }.sibling();
        }

        converted
    }
}

#[inline]
fn last_key<K: IndexKey>(part: &SortedLeaf<K>) -> Option<K> {
    part.len().checked_sub(1).map(|i| part.key(i))
}
