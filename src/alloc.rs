//! Node allocation and typed access to type-erased node pointers.
//!
//! Nodes are boxed and leaked with `Box::into_raw`; the tree addresses them
//! through [`NodePtr`]s. A pointer is cast back to its concrete type by
//! checking the header's level: 0 is a [`LeafNode`], anything else an
//! [`InnerNode`].
//!
//! Nodes themselves are never retired while the tree is alive (splits keep
//! the left node, conversion keeps the leaf shell). Only leaf bodies replaced
//! by conversion go through deferred reclamation; see [`reclaim`].

pub(crate) mod reclaim;

use crate::internode::InnerNode;
use crate::key::IndexKey;
use crate::leaf::{LeafBody, LeafNode};
use crate::node::{NodeHeader, NodePtr};

/// Box a leaf and return its type-erased pointer.
#[must_use]
pub fn alloc_leaf<K: IndexKey>(body: Box<LeafBody<K>>, sibling: NodePtr<K>, high_key: Option<K>) -> NodePtr<K> {
    Box::into_raw(Box::new(LeafNode::new(body, sibling, high_key))).cast()
}

/// Box an inner node and return its type-erased pointer.
#[must_use]
pub fn alloc_inner<K: IndexKey>(node: InnerNode<K>) -> NodePtr<K> {
    Box::into_raw(Box::new(node)).cast()
}

/// Header of any node.
///
/// # Safety
/// `ptr` is a live node pointer produced by this module (or by
/// [`InnerNode::split`] / [`InnerNode::batch_insert`]).
#[inline(always)]
pub unsafe fn header<'a, K: IndexKey>(ptr: NodePtr<K>) -> &'a NodeHeader<K> {
    // SAFETY: caller guarantees a live node; the header is its first field.
    unsafe { &*ptr }
}

/// View a node as a leaf.
///
/// # Safety
/// `ptr` is a live node whose level is 0.
#[inline(always)]
pub unsafe fn as_leaf<'a, K: IndexKey>(ptr: NodePtr<K>) -> &'a LeafNode<K> {
    // SAFETY: LeafNode is #[repr(C)] with the header first; caller checked the level.
    unsafe {
        debug_assert!((*ptr).is_leaf(), "as_leaf: inner node");
        &*ptr.cast::<LeafNode<K>>()
    }
}

/// View a node as an inner node.
///
/// # Safety
/// `ptr` is a live node whose level is at least 1.
#[inline(always)]
pub unsafe fn as_inner<'a, K: IndexKey>(ptr: NodePtr<K>) -> &'a InnerNode<K> {
    // SAFETY: InnerNode is #[repr(C)] with the header first; caller checked the level.
    unsafe {
        debug_assert!(!(*ptr).is_leaf(), "as_inner: leaf node");
        &*ptr.cast::<InnerNode<K>>()
    }
}

/// Free one node (and, for a leaf, its current body).
///
/// # Safety
/// `ptr` came from this module, is unreachable, and no thread can still
/// read it.
pub unsafe fn free_node<K: IndexKey>(ptr: NodePtr<K>) {
    // SAFETY: caller guarantees exclusive ownership of a live node.
    unsafe {
        if (*ptr).is_leaf() {
            drop(Box::from_raw(ptr.cast::<LeafNode<K>>()));
        } else {
            drop(Box::from_raw(ptr.cast::<InnerNode<K>>()));
        }
    }
}
