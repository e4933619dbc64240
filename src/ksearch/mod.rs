//! Key search within a node.
//!
//! Sorted leaves and inner nodes keep their keys in sorted physical order, so
//! search is a plain bound computation. Narrow nodes use a linear scan (no
//! unpredictable branches, friendly to the prefetcher); wider nodes use binary
//! search. The cutoff is [`LINEAR_SEARCH_MAX`].
//!
//! The key accessor is a closure so the same code works for any slot layout.
//! During an optimistic read the keys may be mid-update and out of order; the
//! functions still return an index in `0..=len` and never panic, and the
//! caller's version validation discards the result.
//!
//! # Submodules
//!
//! - [`simd`]: batched fingerprint comparison for hash buckets

pub mod simd;

use crate::config::LINEAR_SEARCH_MAX;

/// First index `i` in `0..len` with `key_at(i) >= key`, or `len`.
#[inline]
pub fn lower_bound<K: Ord, F: Fn(usize) -> K>(len: usize, key: &K, key_at: F) -> usize {
    if len <= LINEAR_SEARCH_MAX {
        (0..len).find(|&i| key_at(i) >= *key).unwrap_or(len)
    } else {
        partition_point(len, |i| key_at(i) < *key)
    }
}

/// First index `i` in `0..len` with `key_at(i) > key`, or `len`.
#[cfg(test)]
fn upper_bound<K: Ord, F: Fn(usize) -> K>(len: usize, key: &K, key_at: F) -> usize {
    if len <= LINEAR_SEARCH_MAX {
        (0..len).find(|&i| key_at(i) > *key).unwrap_or(len)
    } else {
        partition_point(len, |i| key_at(i) <= *key)
    }
}

/// Binary search for the first index where `pred` turns false.
#[inline]
fn partition_point<P: Fn(usize) -> bool>(len: usize, pred: P) -> usize {
    let (mut lo, mut hi) = (0usize, len);

    while lo < hi {
        let mid: usize = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

/// Lower bound that also reports an exact match.
///
/// Returns `(index, found)`; `found` means `key_at(index) == key`.
#[inline]
pub fn search<K: Ord, F: Fn(usize) -> K>(len: usize, key: &K, key_at: F) -> (usize, bool) {
    let idx: usize = lower_bound(len, key, &key_at);
    let found: bool = idx < len && key_at(idx) == *key;
    (idx, found)
}
