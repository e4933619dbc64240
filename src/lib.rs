//! # `BlinkHash`
//!
//! A concurrent ordered index: a B-link tree whose leaves adapt between a
//! hashed and a sorted layout.
//!
//! - Inner nodes are B-link nodes: separators, children, a right sibling
//!   and an inclusive high key, so a reader that lands left of a concurrent
//!   split just moves right.
//! - Leaves start as hash leaves (buckets of fingerprinted slots) for fast
//!   point operations. Hash leaves split lazily: buckets are paired with
//!   their counterpart in the new right leaf and settled by later writers.
//! - The first range scan that reaches a hash leaf converts it into one or
//!   more sorted leaves.
//!
//! Synchronization is optimistic lock coupling: every node and every
//! bucket carries a versioned lock. Readers validate versions instead of
//! locking, writers only `try` locks and restart on failure.
//!
//! ```rust
//! use blinkhash::BlinkHash;
//!
//! let tree: BlinkHash<u64> = BlinkHash::new();
//! let guard = tree.guard();
//!
//! tree.insert_with_guard(10, 100, &guard);
//! tree.insert_with_guard(20, 200, &guard);
//! assert_eq!(tree.lookup_with_guard(&10, &guard), Some(100));
//!
//! let mut out = Vec::new();
//! tree.range_lookup_with_guard(&15, 8, &mut out, &guard);
//! assert_eq!(out, vec![(20, 200)]);
//! ```
//!
//! ## Keys and values
//!
//! Keys implement [`IndexKey`]: `u64` and fixed-size byte arrays are
//! provided. Values are `u64`.
//!
//! ## Not supported
//!
//! No merging or rebalancing on remove, no persistence, no variable-length
//! keys.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot paths are inlined deliberately; see the benches.
#![allow(clippy::inline_always)]

pub mod alloc;
pub mod bucket;
pub mod config;
pub mod hash;
pub mod internode;
pub mod key;
pub mod ksearch;
pub mod leaf;
pub mod node;
pub mod nodeversion;
pub mod ordering;
pub mod tree;

mod tracing_helpers;

pub use config::{DefaultConfig, LeafMode, MedianPolicy, SortedConfig, TreeConfig};
pub use key::IndexKey;
pub use tree::{BlinkHash, InvariantViolation, OpCounters, TreeStats};
