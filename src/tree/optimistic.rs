//! Optimistic reads: lookup and range lookup.
//!
//! Nothing here takes a lock except a range scan that has to convert a hash
//! leaf; that path hands over to [`super::convert`].

use seize::LocalGuard;

use crate::alloc::{as_leaf, header};
use crate::config::TreeConfig;
use crate::key::IndexKey;
use crate::leaf::{LeafBody, LeafNode, LeafScan};
use crate::node::NodePtr;
use crate::nodeversion::{Restart, VersionedLock};
use crate::tracing_helpers::trace_log;

use super::BlinkHash;

impl<K: IndexKey, C: TreeConfig> BlinkHash<K, C> {
    /// One lookup attempt.
    pub(super) fn try_lookup(&self, key: &K) -> Result<Option<u64>, Restart> {
        let (node, version) = self.descend(key, 0, None)?;
        // SAFETY: level 0 node; nodes live as long as the tree.
        let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
        let lock: &VersionedLock = leaf.header().version();

        match leaf.body() {
            LeafBody::Hash(h) => h.lookup(key, lock, version),
            LeafBody::Sorted(s) => {
                let found: Option<u64> = s.lookup(key);
                lock.validate(version)?;
                Ok(found)
            }
        }
    }

    /// One range lookup attempt. `out` is truncated to empty first.
    ///
    /// With a guard, hash leaves are converted (the guard retires their old
    /// bodies) and the scan starts over from `min`; without one they are
    /// read in place.
    pub(super) fn try_range_lookup(
        &self,
        min: &K,
        range: usize,
        out: &mut Vec<(K, u64)>,
        guard: Option<&LocalGuard<'_>>,
    ) -> Result<usize, Restart> {
        out.clear();

        let mut stack: Vec<NodePtr<K>> = Vec::new();
        let (mut node, mut version) = self.descend(min, 0, Some(&mut stack))?;

        loop {
            // SAFETY: leaf level; nodes live as long as the tree.
            let leaf: &LeafNode<K> = unsafe { as_leaf(node) };
            let lock: &VersionedLock = leaf.header().version();
            let remaining: usize = range - out.len();

            match leaf
                .body()
                .range_lookup(min, remaining, out, lock, version, guard.is_some())?
            {
                LeafScan::Done(_) => {}
                LeafScan::NeedsConversion => {
                    let Some(guard) = guard else {
                        return Err(Restart);
                    };

                    // The stack only belongs to the leaf reached by descent;
                    // it is empty for later leaves, which makes propagation
                    // re-descend to find their parent.
                    self.convert_leaf(node, version, std::mem::take(&mut stack), guard)?;
                    trace_log!("range_lookup: rescanning after conversion");

                    out.clear();
                    (node, version) = self.descend(min, 0, Some(&mut stack))?;
                    continue;
                }
            }

            if out.len() >= range {
                return Ok(out.len());
            }

            let sibling: NodePtr<K> = leaf.header().sibling();
            lock.validate(version)?;
            if sibling.is_null() {
                return Ok(out.len());
            }

            // SAFETY: as above.
            let sibling_version: u64 = unsafe { header(sibling) }.version().read_snapshot()?;
            node = sibling;
            version = sibling_version;
            stack.clear();
        }
    }
}
