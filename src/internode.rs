//! Filepath: src/internode.rs
//!
//! Inner (routing) nodes.
//!
//! An [`InnerNode`] holds a `leftmost` child plus up to `width` sorted
//! `(separator, child)` entries. Separators are inclusive upper bounds of
//! the child to their left:
//!
//! ```text
//!            [ K0 | K1 | K2 ]
//!           /     |    |     \
//!    leftmost     C0   C1     C2
//!
//!    leftmost: keys <= K0
//!    C0:       K0 < key <= K1
//!    C1:       K1 < key <= K2
//!    C2:       K2 < key <= high_key
//! ```
//!
//! Keys are in sorted physical order. Mutation requires the node's write
//! lock; readers route optimistically and validate the version afterwards.

use std::sync::atomic::{AtomicPtr, AtomicUsize};

use crate::key::IndexKey;
use crate::ksearch;
use crate::node::{NodeHeader, NodePtr};
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Where a routing step goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<K: IndexKey> {
    /// The key is beyond this node's high key: continue at the sibling.
    Right(NodePtr<K>),

    /// Descend into this child.
    Down(NodePtr<K>),
}

/// Routing node.
#[repr(C)]
pub struct InnerNode<K: IndexKey> {
    header: NodeHeader<K>,
    count: AtomicUsize,
    leftmost: AtomicPtr<NodeHeader<K>>,
    keys: Box<[K::Slot]>,
    children: Box<[AtomicPtr<NodeHeader<K>>]>,
}

impl<K: IndexKey> InnerNode<K> {
    /// Create an inner node at `level` (>= 1) with no separators.
    #[must_use]
    pub fn new(
        level: u32,
        width: usize,
        leftmost: NodePtr<K>,
        sibling: NodePtr<K>,
        high_key: Option<K>,
    ) -> Self {
        debug_assert!(level >= 1, "inner node at leaf level");

        Self {
            header: NodeHeader::new(level, sibling, high_key),
            count: AtomicUsize::new(0),
            leftmost: AtomicPtr::new(leftmost),
            keys: (0..width).map(|_| K::empty_slot()).collect(),
            children: (0..width)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
        }
    }

    /// Shared header.
    #[inline(always)]
    #[must_use]
    pub const fn header(&self) -> &NodeHeader<K> {
        &self.header
    }

    /// Separator capacity.
    #[inline(always)]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Number of separators, clamped to the capacity.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(READ_ORD).min(self.capacity())
    }

    /// True when the node routes everything to `leftmost`.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Separator `i`.
    #[inline(always)]
    #[must_use]
    pub fn key(&self, i: usize) -> K {
        K::load(&self.keys[i])
    }

    /// Child right of separator `i`.
    #[inline(always)]
    #[must_use]
    pub fn child(&self, i: usize) -> NodePtr<K> {
        self.children[i].load(READ_ORD)
    }

    /// Child covering keys up to the first separator.
    #[inline(always)]
    #[must_use]
    pub fn leftmost(&self) -> NodePtr<K> {
        self.leftmost.load(READ_ORD)
    }

    #[inline(always)]
    fn write(&self, i: usize, key: K, child: NodePtr<K>) {
        K::store(&self.keys[i], key);
        self.children[i].store(child, WRITE_ORD);
    }

    /// All `(separator, child)` entries.
    #[must_use]
    pub fn entries(&self) -> Vec<(K, NodePtr<K>)> {
        (0..self.len()).map(|i| (self.key(i), self.child(i))).collect()
    }

    /// Every child pointer, leftmost first.
    pub fn children(&self) -> impl Iterator<Item = NodePtr<K>> + '_ {
        std::iter::once(self.leftmost()).chain((0..self.len()).map(|i| self.child(i)))
    }

    // ========================================================================
    //  Routing
    // ========================================================================

    /// Child whose range holds `key`, ignoring the high key.
    #[inline]
    #[must_use]
    pub fn child_for(&self, key: &K) -> NodePtr<K> {
        match ksearch::lower_bound(self.len(), key, |i| self.key(i)) {
            0 => self.leftmost(),
            idx => self.child(idx - 1),
        }
    }

    /// Route `key`: right to the sibling if it exceeds the high key,
    /// otherwise down to the covering child.
    #[inline]
    #[must_use]
    pub fn scan_node(&self, key: &K) -> Route<K> {
        if self.header.must_move_right(key) {
            let sibling: NodePtr<K> = self.header.sibling();
            if !sibling.is_null() {
                return Route::Right(sibling);
            }
        }

        Route::Down(self.child_for(key))
    }

    // ========================================================================
    //  Mutation (caller holds the write lock)
    // ========================================================================

    /// Insert a separator and the child to its right.
    ///
    /// Returns `false` (and changes nothing) when the node is full.
    pub fn insert(&self, key: K, child: NodePtr<K>) -> bool {
        let len: usize = self.len();
        if len >= self.capacity() {
            return false;
        }

        let pos: usize = ksearch::lower_bound(len, &key, |i| self.key(i));
        debug_assert!(pos == len || self.key(pos) != key, "insert: duplicate separator");

        for i in (pos..len).rev() {
            self.write(i + 1, self.key(i), self.child(i));
        }
        self.write(pos, key, child);
        self.count.store(len + 1, WRITE_ORD);
        true
    }

    /// Replace all separators with `entries` (sorted, within capacity).
    fn rewrite(&self, entries: &[(K, NodePtr<K>)]) {
        debug_assert!(entries.len() <= self.capacity(), "rewrite: overflow");

        for (i, &(key, child)) in entries.iter().enumerate() {
            self.write(i, key, child);
        }
        self.count.store(entries.len(), WRITE_ORD);
    }

    /// Split around the median separator.
    ///
    /// The median separator moves up; its child becomes the new node's
    /// `leftmost`, and the separators above it move to the new node. The
    /// new node is linked as this node's sibling before being returned.
    ///
    /// Returns `(separator, right)`.
    #[must_use]
    pub fn split(&self) -> (K, NodePtr<K>) {
        let len: usize = self.len();
        debug_assert!(len >= 3, "split: too few separators");

        let mid: usize = len / 2;
        let separator: K = self.key(mid);

        let right = Box::new(Self::new(
            self.header.level(),
            self.capacity(),
            self.child(mid),
            std::ptr::null_mut(),
            None,
        ));
        for (dst, src) in (mid + 1..len).enumerate() {
            right.write(dst, self.key(src), self.child(src));
        }
        right.count.store(len - mid - 1, WRITE_ORD);

        let right: *mut Self = Box::into_raw(right);

        // SAFETY: just allocated, not yet shared.
        self.header.link_right(unsafe { &(*right).header }, separator);
        self.count.store(mid, WRITE_ORD);

        (separator, right.cast())
    }

    /// Insert many separators at once.
    ///
    /// When everything fits, the node is rewritten in place and nothing is
    /// returned. Otherwise the merged entries are spread over this node and
    /// as many new right siblings as needed, `batch` separators each (the
    /// fill-factor share of the width). The new nodes are linked into the
    /// sibling chain; the returned `(separator, node)` pairs must go to the
    /// parent.
    #[must_use]
    pub fn batch_insert(&self, new: &[(K, NodePtr<K>)], batch: usize) -> Vec<(K, NodePtr<K>)> {
        let mut all: Vec<(K, NodePtr<K>)> = self.entries();
        all.extend_from_slice(new);
        all.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        if all.len() <= self.capacity() {
            self.rewrite(&all);
            return Vec::new();
        }

        let batch: usize = batch.clamp(1, self.capacity());
        let (head, mut rest) = all.split_at(batch);

        let high_key: Option<K> = self.header.high_key();
        let sibling: NodePtr<K> = self.header.sibling();

        self.rewrite(head);

        let mut created: Vec<(K, NodePtr<K>)> = Vec::new();
        let mut tail: &Self = self;

        while let Some((&(separator, leftmost), remaining)) = rest.split_first() {
            let take: usize = remaining.len().min(batch);

            let node = Box::new(Self::new(
                self.header.level(),
                self.capacity(),
                leftmost,
                std::ptr::null_mut(),
                None,
            ));
            node.rewrite(&remaining[..take]);
            let node: *mut Self = Box::into_raw(node);

            tail.header.set_high_key(Some(separator));
            tail.header.set_sibling(node.cast());
            created.push((separator, node.cast()));

            // SAFETY: just allocated; reachable only through `tail`, which we hold locked.
            tail = unsafe { &*node };
            rest = &remaining[take..];
        }

        tail.header.set_high_key(high_key);
        tail.header.set_sibling(sibling);

        created
    }
}

impl<K: IndexKey> std::fmt::Debug for InnerNode<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerNode")
            .field("header", &self.header)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
