//! Reclaim helpers for seize-based memory reclamation.
//!
//! This module provides:
//! - the reclaimer for leaf bodies retired by conversion
//! - level-by-level teardown for `Drop`

// This module is private, so pub(crate) is effectively the same as pub.
#![allow(clippy::redundant_pub_crate)]

use seize::{Collector, Guard};

use crate::alloc::{as_inner, free_node, header};
use crate::key::IndexKey;
use crate::leaf::LeafBody;
use crate::node::NodePtr;

/// Drop a boxed leaf body (seize callback).
///
/// # Safety
/// `ptr` came from `Box::into_raw` and seize determined no reader remains.
pub(crate) unsafe fn reclaim_body<K: IndexKey>(ptr: *mut LeafBody<K>, _collector: &Collector) {
    // SAFETY: caller guarantees ptr is valid, unique and from Box::into_raw.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Schedule a replaced leaf body for reclamation once every guard that may
/// have observed it is gone.
///
/// # Safety
/// `ptr` came from `Box::into_raw`, is no longer reachable from the tree,
/// and is retired exactly once.
pub(crate) unsafe fn retire_body<K: IndexKey, G: Guard>(guard: &G, ptr: *mut LeafBody<K>) {
    // SAFETY: forwarded from the caller.
    unsafe { guard.defer_retire(ptr, reclaim_body::<K>) };
}

/// Free every node reachable from `root`.
///
/// Walks each level left to right along sibling pointers, starting from the
/// leftmost node of the level (the `leftmost` chain from the root).
///
/// # Safety
/// No other thread can access the tree, and every split has finished
/// publishing (each level is one sibling chain under the root).
pub(crate) unsafe fn teardown<K: IndexKey>(root: NodePtr<K>) -> usize {
    let mut freed: usize = 0;
    let mut level_start: NodePtr<K> = root;

    while !level_start.is_null() {
        // SAFETY: level_start is live until freed below.
        let below: NodePtr<K> = unsafe {
            if header(level_start).is_leaf() {
                std::ptr::null_mut()
            } else {
                as_inner(level_start).leftmost()
            }
        };

        let mut node: NodePtr<K> = level_start;
        while !node.is_null() {
            // SAFETY: each node on the chain is live and visited once.
            unsafe {
                let next: NodePtr<K> = header(node).sibling();
                free_node(node);
                node = next;
            }
            freed += 1;
        }

        level_start = below;
    }

    freed
}
