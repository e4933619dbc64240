//! The upward propagation loop.
//!
//! # Key Invariant
//!
//! The node that just split stays locked until its separators are in the
//! parent. Locks are taken child first, parent second, and the parent is
//! only try-locked, so two propagations can never wait on each other in a
//! cycle.
//!
//! # Parent lookup
//!
//! The descent stack gives a first guess at the parent. The guess may have
//! split since; moving right along its level finds the node that now
//! covers the separator. With no guess left (an empty stack, or a root that
//! grew after the descent) the parent level is reached by a fresh descent.

use crate::alloc::{as_inner, header};
use crate::config::TreeConfig;
use crate::internode::InnerNode;
use crate::key::IndexKey;
use crate::node::{NodeHeader, NodePtr};
use crate::nodeversion::{Backoff, LockGuard, Restart};
use crate::tracing_helpers::{debug_log, trace_log};

use super::super::BlinkHash;
use super::RootCreation;

/// What parent lookup produced.
enum Parent<'n, K: IndexKey> {
    /// The covering parent, locked.
    Locked(NodePtr<K>, LockGuard<'n>),

    /// The child is the root: grow the tree instead.
    GrowRoot,
}

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Install `pending` separators, produced by splitting `child`, into the
    /// levels above it.
    ///
    /// `child` is locked by `child_guard` and already linked to its new
    /// right siblings. `stack` holds the inner nodes descended through on
    /// the way to `child`, root first. Returns once every level is updated;
    /// all locks taken here are released.
    pub(in crate::tree) fn propagate<'n>(
        &self,
        mut stack: Vec<NodePtr<K>>,
        mut child_guard: LockGuard<'n>,
        mut child: NodePtr<K>,
        mut pending: Vec<(K, NodePtr<K>)>,
    ) {
        while !pending.is_empty() {
            // SAFETY: nodes live as long as the tree.
            let level: u32 = unsafe { header(child) }.level() + 1;

            let (parent, parent_guard): (NodePtr<K>, LockGuard<'n>) =
                match self.lock_parent(&mut stack, child, level, &pending[0].0) {
                    Parent::Locked(parent, guard) => (parent, guard),
                    Parent::GrowRoot => {
                        if let Some(added) = RootCreation::grow(
                            &self.root,
                            child,
                            level,
                            &pending,
                            C::INNER_WIDTH,
                            C::inner_batch(),
                        ) {
                            self.counters
                                .root_growths
                                .fetch_add(u64::from(added), crate::ordering::RELAXED);
                            debug_log!(levels = added, "root grew");
                            return;
                        }
                        // Someone else replaced the root; look again.
                        continue;
                    }
                };

            // SAFETY: locked by us, level >= 1.
            let node: &InnerNode<K> = unsafe { as_inner(parent) };
            pending = self.install(node, &pending);

            // Releases the child.
            child_guard = parent_guard;
            child = parent;
        }

        drop(child_guard);
    }

    /// Insert separators into a locked inner node, splitting it if needed.
    /// Returns the separators its own split produced.
    fn install(&self, node: &InnerNode<K>, separators: &[(K, NodePtr<K>)]) -> Vec<(K, NodePtr<K>)> {
        if let &[(key, right)] = separators {
            if node.insert(key, right) {
                return Vec::new();
            }

            let (separator, sibling) = node.split();
            // SAFETY: just created by the split and linked behind `node`,
            // which is still locked.
            let target: &InnerNode<K> = if key <= separator {
                node
            } else {
                unsafe { as_inner(sibling) }
            };
            let placed: bool = target.insert(key, right);
            debug_assert!(placed, "half of a split inner node is full");

            Self::bump(&self.counters.inner_splits);
            debug_log!(separator = ?separator, "inner node split");
            return vec![(separator, sibling)];
        }

        let overflow: Vec<(K, NodePtr<K>)> = node.batch_insert(separators, C::inner_batch());
        self.counters
            .inner_splits
            .fetch_add(overflow.len() as u64, crate::ordering::RELAXED);
        overflow
    }

    /// Find and lock the node at `level` covering `key`, the parent of
    /// `child`.
    fn lock_parent<'n>(
        &self,
        stack: &mut Vec<NodePtr<K>>,
        child: NodePtr<K>,
        level: u32,
        key: &K,
    ) -> Parent<'n, K> {
        let mut backoff: Backoff = Backoff::new();
        let mut guess: Option<NodePtr<K>> = stack.pop();

        loop {
            let start: NodePtr<K> = match guess {
                Some(node) => node,
                None => {
                    if self.load_root() == child {
                        return Parent::GrowRoot;
                    }

                    match self.descend(key, level, Some(stack)) {
                        Ok((node, _)) => {
                            // The descent ran above the parent; keep its path
                            // for the levels after this one.
                            guess = Some(node);
                            node
                        }
                        Err(Restart) => {
                            // The root may still be one level short while
                            // another thread publishes its growth.
                            trace_log!(parent_level = level, "parent level not reachable yet");
                            backoff.snooze();
                            continue;
                        }
                    }
                }
            };

            match self.try_lock_covering(start, key) {
                Ok((node, guard)) => return Parent::Locked(node, guard),
                Err(Restart) => {
                    Self::bump(&self.counters.restarts);
                    backoff.snooze();
                }
            }
        }
    }

    /// Move right from `start` to the node covering `key` and lock it.
    fn try_lock_covering<'n>(&self, start: NodePtr<K>, key: &K) -> Result<(NodePtr<K>, LockGuard<'n>), Restart> {
        // SAFETY: nodes live as long as the tree.
        let version: u64 = unsafe { header(start) }.version().read_snapshot()?;
        let (node, version) = self.move_right(key, start, version)?;

        // SAFETY: as above.
        let hdr: &'n NodeHeader<K> = unsafe { header(node) };
        let guard: LockGuard<'n> = hdr.version().try_upgrade_writelock(version).ok_or(Restart)?;

        Ok((node, guard))
    }
}
