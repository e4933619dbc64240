//! Compile-time tree configuration.
//!
//! A configuration is a zero-sized type implementing [`TreeConfig`]. Node
//! capacities are associated constants, so every tree type carries its
//! layout in its type:
//!
//! ```rust
//! use blinkhash::config::{LeafMode, MedianPolicy, TreeConfig};
//! use blinkhash::BlinkHash;
//!
//! struct Small;
//!
//! impl TreeConfig for Small {
//!     const INNER_WIDTH: usize = 8;
//!     const SORTED_WIDTH: usize = 8;
//!     const HASH_BUCKETS: usize = 8;
//!     const LEAF_MODE: LeafMode = LeafMode::Sorted;
//!     const MEDIAN: MedianPolicy = MedianPolicy::Exact;
//! }
//!
//! let tree: BlinkHash<u64, Small> = BlinkHash::new();
//! tree.insert(7, 70);
//! assert_eq!(tree.lookup(&7), Some(70));
//! ```

/// Entries per bucket: one 16-byte vector of fingerprints.
pub const BUCKET_SLOTS: usize = 16;

/// Independent bucket hash functions per key.
pub const HASH_FUNCS: usize = 2;

/// Consecutive buckets probed from each hash function's start bucket.
pub const PROBE_BUCKETS: usize = 4;

/// Widths up to this use linear search; wider nodes use binary search.
pub const LINEAR_SEARCH_MAX: usize = 16;

/// Which leaf representation new leaves use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafMode {
    /// Start with hash leaves; range scans convert them to sorted leaves.
    Adaptive,

    /// Sorted leaves only (a plain OLC B-link tree).
    Sorted,
}

/// How a hash leaf picks its split key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedianPolicy {
    /// Quickselect over every live key: balanced halves, O(n).
    Exact,

    /// Quickselect over this many randomly sampled keys: approximate halves,
    /// cost bounded by the sample size.
    Sampled(usize),
}

/// Compile-time layout of a tree.
pub trait TreeConfig: Send + Sync + 'static {
    /// Separator capacity of an inner node.
    const INNER_WIDTH: usize;

    /// Entry capacity of a sorted leaf.
    const SORTED_WIDTH: usize;

    /// Buckets per hash leaf.
    const HASH_BUCKETS: usize;

    /// Target fill of nodes built in bulk (conversion and batch insertion).
    const FILL_FACTOR: f64 = 0.8;

    /// Representation of the initial leaf and of leaves created by splits.
    const LEAF_MODE: LeafMode = LeafMode::Adaptive;

    /// Split-key selection for hash leaves.
    const MEDIAN: MedianPolicy = MedianPolicy::Sampled(128);

    /// Entries per sorted leaf produced by conversion.
    #[must_use]
    fn sorted_batch() -> usize {
        fill(Self::SORTED_WIDTH, Self::FILL_FACTOR)
    }

    /// Separators per inner node produced by batch insertion.
    #[must_use]
    fn inner_batch() -> usize {
        fill(Self::INNER_WIDTH, Self::FILL_FACTOR)
    }

    /// Panic on an unusable configuration.
    ///
    /// # Panics
    /// If any capacity is too small or the fill factor is out of range.
    fn validate() {
        assert!(Self::INNER_WIDTH >= 3, "INNER_WIDTH must be at least 3");
        assert!(Self::SORTED_WIDTH >= 3, "SORTED_WIDTH must be at least 3");
        assert!(
            Self::HASH_BUCKETS >= PROBE_BUCKETS,
            "HASH_BUCKETS must cover one probe window"
        );
        assert!(
            (0.5..=1.0).contains(&Self::FILL_FACTOR),
            "FILL_FACTOR must be within 0.5..=1.0"
        );
        if let MedianPolicy::Sampled(n) = Self::MEDIAN {
            assert!(n >= 3, "sample size must be at least 3");
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "node widths are small"
)]
fn fill(width: usize, factor: f64) -> usize {
    ((width as f64 * factor) as usize).clamp(1, width)
}

/// Defaults: 32-wide inner and sorted nodes, 64-bucket hash leaves
/// (1024 entry slots), adaptive leaves, sampled median.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl TreeConfig for DefaultConfig {
    const INNER_WIDTH: usize = 32;
    const SORTED_WIDTH: usize = 32;
    const HASH_BUCKETS: usize = 64;
}

/// Plain B-link tree with sorted leaves only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedConfig;

impl TreeConfig for SortedConfig {
    const INNER_WIDTH: usize = 32;
    const SORTED_WIDTH: usize = 32;
    const HASH_BUCKETS: usize = 64;
    const LEAF_MODE: LeafMode = LeafMode::Sorted;
}
