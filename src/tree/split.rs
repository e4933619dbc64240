//! Hand-over-hand split propagation.
//!
//! A split leaves the left node locked while its parent is located, locked
//! and given the new separators; only then is the left node released and
//! the parent becomes the node being propagated from. The new right node is
//! reachable through the sibling chain the whole time, so readers never
//! depend on the parent update.
//!
//! # Module Organization
//!
//! - `propagation`: the upward loop and parent locking
//! - [`RootCreation`]: growing the tree by one or more levels

mod propagation;
mod root_creation;

pub(super) use root_creation::RootCreation;
