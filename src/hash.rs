//! Seeded key hashing for hash leaves.
//!
//! A key has [`HASH_FUNCS`] independent bucket hashes plus a one-byte
//! fingerprint taken from a third seed. Each bucket hash starts a window of
//! [`PROBE_BUCKETS`] consecutive buckets; the windows together form the key's
//! candidate list, probed in order.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::config::{HASH_FUNCS, PROBE_BUCKETS};
use crate::key::IndexKey;

/// FNV offset keys: one per bucket hash, then the fingerprint seed.
const SEEDS: [u64; HASH_FUNCS + 1] = [
    0xcbf2_9ce4_8422_2325,
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
];

/// Index of the fingerprint seed.
const FINGERPRINT_SEED: usize = HASH_FUNCS;

/// Number of entries in a candidate list.
pub const CANDIDATES: usize = HASH_FUNCS * PROBE_BUCKETS;

/// Finalizer so that low bits (used for bucket selection) depend on every input byte.
#[inline(always)]
const fn mix(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
fn seeded<K: IndexKey>(key: &K, seed: usize) -> u64 {
    let mut hasher = FnvHasher::with_key(SEEDS[seed]);
    key.hash(&mut hasher);
    mix(hasher.finish())
}

/// Hash `key` with bucket hash function `func` (`0..HASH_FUNCS`).
#[inline]
#[must_use]
pub fn bucket_hash<K: IndexKey>(key: &K, func: usize) -> u64 {
    debug_assert!(func < HASH_FUNCS, "bucket_hash: no such hash function");
    seeded(key, func)
}

/// One-byte fingerprint, never zero (zero marks an empty slot).
#[inline]
#[must_use]
pub fn fingerprint<K: IndexKey>(key: &K) -> u8 {
    #[expect(clippy::cast_possible_truncation, reason = "top byte of the hash")]
    let fp: u8 = (seeded(key, FINGERPRINT_SEED) >> 56) as u8;
    if fp == 0 { 1 } else { fp }
}

/// Candidate bucket indices in probe order.
///
/// Windows of different hash functions may overlap, so the list can repeat
/// an index.
#[inline]
#[must_use]
pub fn candidates<K: IndexKey>(key: &K, nbuckets: usize) -> [usize; CANDIDATES] {
    let mut out: [usize; CANDIDATES] = [0; CANDIDATES];

    for func in 0..HASH_FUNCS {
        #[expect(clippy::cast_possible_truncation, reason = "reduced modulo nbuckets")]
        let start: usize = (bucket_hash(key, func) % nbuckets as u64) as usize;

        for probe in 0..PROBE_BUCKETS {
            out[func * PROBE_BUCKETS + probe] = (start + probe) % nbuckets;
        }
    }

    out
}

/// Candidate indices, sorted and deduplicated: the order in which a writer
/// locks them.
#[inline]
#[must_use]
pub fn lock_order(candidates: &[usize; CANDIDATES]) -> ([usize; CANDIDATES], usize) {
    let mut sorted: [usize; CANDIDATES] = *candidates;
    sorted.sort_unstable();

    let mut len: usize = 0;
    for i in 0..CANDIDATES {
        if len == 0 || sorted[len - 1] != sorted[i] {
            sorted[len] = sorted[i];
            len += 1;
        }
    }

    (sorted, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_never_zero() {
        for key in 0..100_000u64 {
            assert_ne!(fingerprint(&key), 0);
        }
    }

    #[test]
    fn test_hash_functions_differ() {
        let differing = (0..1000u64)
            .filter(|k| bucket_hash(k, 0) != bucket_hash(k, 1))
            .count();
        assert!(differing > 990);
    }

    #[test]
    fn test_candidates_are_in_range_and_windowed() {
        let nbuckets = 16;
        for key in 0..500u64 {
            let c = candidates(&key, nbuckets);
            assert!(c.iter().all(|&b| b < nbuckets));
            for func in 0..HASH_FUNCS {
                let base = c[func * PROBE_BUCKETS];
                for probe in 0..PROBE_BUCKETS {
                    assert_eq!(c[func * PROBE_BUCKETS + probe], (base + probe) % nbuckets);
                }
            }
        }
    }

    #[test]
    fn test_lock_order_dedups() {
        let c: [usize; CANDIDATES] = [5, 6, 7, 0, 6, 7, 0, 1];
        let (sorted, len) = lock_order(&c);
        assert_eq!(&sorted[..len], &[0, 1, 5, 6, 7]);
    }

    #[test]
    fn test_blob_keys_hash() {
        let a: [u8; 16] = *b"0123456789abcdef";
        let b: [u8; 16] = *b"0123456789abcdeg";
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(candidates(&a, 1 << 20), candidates(&b, 1 << 20));
    }
}
