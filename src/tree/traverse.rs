//! Root-to-node descent.
//!
//! Every step snapshots the child before validating the parent, so a
//! pointer read from a node is only followed once the node was stable
//! across the read. A node whose high key is below the search key has
//! split concurrently; the walk then moves right along sibling pointers.

use crate::alloc::{as_inner, header};
use crate::config::TreeConfig;
use crate::internode::Route;
use crate::key::IndexKey;
use crate::node::{NodeHeader, NodePtr};
use crate::nodeversion::Restart;

use super::BlinkHash;

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// Reach the node at `level` whose range covers `key`, returning it with
    /// its version snapshot.
    ///
    /// When `stack` is given it is cleared and then receives every inner
    /// node the walk went down from, root first. Nodes only passed through
    /// by moving right are not recorded.
    ///
    /// # Errors
    /// [`Restart`] on a failed validation, or when the root is below `level`
    /// (a root growth is still being published).
    pub(super) fn descend(
        &self,
        key: &K,
        level: u32,
        mut stack: Option<&mut Vec<NodePtr<K>>>,
    ) -> Result<(NodePtr<K>, u64), Restart> {
        if let Some(stack) = stack.as_deref_mut() {
            stack.clear();
        }

        let mut node: NodePtr<K> = self.load_root();
        // SAFETY: nodes are never freed while the tree is alive.
        let mut hdr: &NodeHeader<K> = unsafe { header(node) };
        if hdr.level() < level {
            return Err(Restart);
        }
        let mut version: u64 = hdr.version().read_snapshot()?;

        while hdr.level() > level {
            // SAFETY: level > 0, so this is an inner node.
            let route: Route<K> = unsafe { as_inner(node) }.scan_node(key);
            let (next, down): (NodePtr<K>, bool) = match route {
                Route::Right(sibling) => (sibling, false),
                Route::Down(child) => (child, true),
            };

            if next.is_null() {
                hdr.version().validate(version)?;
                return Err(Restart);
            }

            // SAFETY: as above.
            let next_hdr: &NodeHeader<K> = unsafe { header(next) };
            let next_version: u64 = next_hdr.version().read_snapshot()?;
            hdr.version().validate(version)?;

            if down {
                if let Some(stack) = stack.as_deref_mut() {
                    stack.push(node);
                }
            }

            node = next;
            hdr = next_hdr;
            version = next_version;
        }

        self.move_right(key, node, version)
    }

    /// From a snapshotted node, follow siblings until the high key covers
    /// `key`.
    ///
    /// # Errors
    /// [`Restart`] on a failed validation.
    pub(super) fn move_right(
        &self,
        key: &K,
        mut node: NodePtr<K>,
        mut version: u64,
    ) -> Result<(NodePtr<K>, u64), Restart> {
        loop {
            // SAFETY: nodes are never freed while the tree is alive.
            let hdr: &NodeHeader<K> = unsafe { header(node) };
            if !hdr.must_move_right(key) {
                return Ok((node, version));
            }

            let sibling: NodePtr<K> = hdr.sibling();
            if sibling.is_null() {
                // A bounded node always has a sibling; this read was torn.
                hdr.version().validate(version)?;
                return Err(Restart);
            }

            // SAFETY: as above.
            let sibling_version: u64 = unsafe { header(sibling) }.version().read_snapshot()?;
            hdr.version().validate(version)?;

            node = sibling;
            version = sibling_version;
        }
    }

    /// The leftmost leaf: follow leftmost children from the root.
    ///
    /// Leftmost pointers of the leftmost nodes never change (splits keep the
    /// left node), so this needs no validation.
    pub(super) fn leftmost_leaf(&self) -> NodePtr<K> {
        let mut node: NodePtr<K> = self.load_root();

        // SAFETY: nodes are never freed while the tree is alive.
        unsafe {
            while !header(node).is_leaf() {
                node = as_inner(node).leftmost();
            }
        }

        node
    }
}
