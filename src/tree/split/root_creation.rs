//! Root growth.
//!
//! The new root levels are built privately on top of the old root and then
//! installed with one CAS on the root pointer. The old root stays locked by
//! the caller throughout, so at most one grower can expect it.
//!
//! # CAS Failure Policy
//!
//! If the CAS fails the private nodes are freed right away: no other thread
//! ever saw them.

use std::sync::atomic::AtomicPtr;

use crate::alloc::{alloc_inner, as_inner, free_node};
use crate::internode::InnerNode;
use crate::key::IndexKey;
use crate::node::{NodeHeader, NodePtr};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS};

/// Unit struct namespace for root creation.
pub struct RootCreation;

impl RootCreation {
    /// Put new levels above `old_root` holding `separators`, then swing the
    /// root pointer to the top one.
    ///
    /// `first_level` is one above `old_root`'s level. `separators` are
    /// `(key, node)` pairs at `old_root`'s level, right of `old_root`,
    /// ascending. If they do not fit one node, batch insertion
    /// spreads them over several and another level goes on top, until one
    /// node remains.
    ///
    /// Returns the number of levels added, or `None` if `old_root` was no
    /// longer the root.
    pub fn grow<K: IndexKey>(
        root: &AtomicPtr<NodeHeader<K>>,
        old_root: NodePtr<K>,
        first_level: u32,
        separators: &[(K, NodePtr<K>)],
        width: usize,
        batch: usize,
    ) -> Option<u32> {
        let mut created: Vec<NodePtr<K>> = Vec::new();
        let mut leftmost: NodePtr<K> = old_root;
        let mut level: u32 = first_level;
        let mut pending: Vec<(K, NodePtr<K>)> = separators.to_vec();

        let top: NodePtr<K> = loop {
            let node: NodePtr<K> = alloc_inner(InnerNode::new(
                level,
                width,
                leftmost,
                std::ptr::null_mut(),
                None,
            ));
            created.push(node);

            // SAFETY: just allocated and private to this thread.
            let overflow: Vec<(K, NodePtr<K>)> = unsafe { as_inner(node) }.batch_insert(&pending, batch);
            if overflow.is_empty() {
                break node;
            }

            created.extend(overflow.iter().map(|&(_, sibling)| sibling));
            leftmost = node;
            pending = overflow;
            level += 1;
        };

        match root.compare_exchange(old_root, top, CAS_SUCCESS, CAS_FAILURE) {
            Ok(_) => Some(level - first_level + 1),
            Err(_) => {
                for node in created {
                    // SAFETY: never published; each pointer appears once.
                    unsafe { free_node(node) };
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{alloc_leaf, header};
    use crate::alloc::reclaim::teardown;
    use crate::leaf::{LeafBody, SortedLeaf};

    fn leaf(high: Option<u64>) -> NodePtr<u64> {
        alloc_leaf(
            Box::new(LeafBody::Sorted(SortedLeaf::new(4))),
            std::ptr::null_mut(),
            high,
        )
    }

    /// Chain `n` leaves; returns the first and the separators of the rest.
    fn chain(n: u64) -> (NodePtr<u64>, Vec<(u64, NodePtr<u64>)>) {
        let first = leaf(Some(10));
        let mut tail = first;
        let mut seps = Vec::new();
        for i in 1..n {
            let high = if i + 1 == n { None } else { Some((i + 1) * 10) };
            let next = leaf(high);
            // SAFETY: private nodes.
            unsafe { header(tail).set_sibling(next) };
            seps.push((i * 10, next));
            tail = next;
        }
        (first, seps)
    }

    #[test]
    fn test_grow_one_level() {
        let (first, seps) = chain(3);
        let root = AtomicPtr::new(first);

        assert_eq!(RootCreation::grow(&root, first, 1, &seps, 4, 3), Some(1));

        let top = root.load(crate::ordering::READ_ORD);
        // SAFETY: installed above; torn down at the end.
        unsafe {
            assert_eq!(header(top).level(), 1);
            assert_eq!(as_inner(top).len(), 2);
            assert_eq!(as_inner(top).leftmost(), first);
            assert_eq!(teardown(top), 4);
        }
    }

    #[test]
    fn test_grow_several_levels() {
        let (first, seps) = chain(12);
        let root = AtomicPtr::new(first);

        // Eleven separators, three per node: two inner levels.
        assert_eq!(RootCreation::grow(&root, first, 1, &seps, 4, 3), Some(2));

        let top = root.load(crate::ordering::READ_ORD);
        // SAFETY: installed above; torn down at the end.
        unsafe {
            assert_eq!(header(top).level(), 2);
            assert!(header(top).sibling().is_null());
            assert_eq!(teardown(top), 12 + 3 + 1);
        }
    }

    #[test]
    fn test_grow_loses_race() {
        let (first, seps) = chain(2);
        let other = leaf(None);
        let root = AtomicPtr::new(other);

        assert_eq!(RootCreation::grow(&root, first, 1, &seps, 4, 3), None);
        assert_eq!(root.load(crate::ordering::READ_ORD), other);

        // SAFETY: nothing else references these nodes.
        unsafe {
            teardown(first);
            teardown(other);
        }
    }
}
