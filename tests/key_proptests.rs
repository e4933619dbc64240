//! Property-based tests for the `key` and `hash` modules.
//!
//! These tests verify invariants and properties that should hold for all inputs.

use blinkhash::IndexKey;
use blinkhash::config::{HASH_FUNCS, PROBE_BUCKETS};
use blinkhash::hash::{CANDIDATES, bucket_hash, candidates, fingerprint, lock_order};
use blinkhash::key::HighKey;
use proptest::prelude::*;

// ============================================================================
//  Strategies
// ============================================================================

/// Bucket counts from the smallest legal one upward.
fn bucket_count() -> impl Strategy<Value = usize> {
    4usize..256
}

// ============================================================================
//  Slot Properties
// ============================================================================

proptest! {
    /// A stored `u64` loads back unchanged.
    #[test]
    fn u64_slot_preserves_key(key in any::<u64>()) {
        let slot = <u64 as IndexKey>::empty_slot();
        <u64 as IndexKey>::store(&slot, key);
        prop_assert_eq!(<u64 as IndexKey>::load(&slot), key);
    }

    /// Byte keys survive a store, and overwriting replaces every byte.
    #[test]
    fn blob_slot_overwrites_fully(first in any::<[u8; 16]>(), second in any::<[u8; 16]>()) {
        let slot = <[u8; 16] as IndexKey>::empty_slot();
        <[u8; 16] as IndexKey>::store(&slot, first);
        prop_assert_eq!(<[u8; 16] as IndexKey>::load(&slot), first);
        <[u8; 16] as IndexKey>::store(&slot, second);
        prop_assert_eq!(<[u8; 16] as IndexKey>::load(&slot), second);
    }

    /// Byte keys order like slices.
    #[test]
    fn blob_order_is_lexicographic(a in any::<[u8; 8]>(), b in any::<[u8; 8]>()) {
        prop_assert_eq!(a.cmp(&b), a.as_slice().cmp(b.as_slice()));
    }
}

// ============================================================================
//  HighKey Properties
// ============================================================================

proptest! {
    /// A present bound is exceeded exactly by larger keys.
    #[test]
    fn high_key_is_inclusive(bound in any::<u64>(), key in any::<u64>()) {
        let high = HighKey::new(Some(bound));
        prop_assert_eq!(high.load(), Some(bound));
        prop_assert_eq!(high.is_exceeded_by(&key), key > bound);
        prop_assert!(!high.is_exceeded_by(&bound));
    }

    /// An absent bound is never exceeded, and can be set and cleared.
    #[test]
    fn absent_high_key_is_infinite(key in any::<u64>(), later in any::<u64>()) {
        let high: HighKey<u64> = HighKey::new(None);
        prop_assert!(!high.is_exceeded_by(&key));

        high.store(Some(later));
        prop_assert_eq!(high.load(), Some(later));

        high.store(None);
        prop_assert_eq!(high.load(), None);
        prop_assert!(!high.is_exceeded_by(&u64::MAX));
    }
}

// ============================================================================
//  Hash Properties
// ============================================================================

proptest! {
    /// Fingerprints never collide with the empty-slot marker.
    #[test]
    fn fingerprint_is_nonzero(key in any::<u64>()) {
        prop_assert_ne!(fingerprint(&key), 0);
    }

    /// Hashing is a pure function of the key.
    #[test]
    fn hashing_is_deterministic(key in any::<[u8; 12]>(), func in 0usize..HASH_FUNCS) {
        prop_assert_eq!(bucket_hash(&key, func), bucket_hash(&key, func));
        prop_assert_eq!(fingerprint(&key), fingerprint(&key));
    }

    /// Every candidate is a valid bucket, and each probe window is contiguous
    /// modulo the bucket count.
    #[test]
    fn candidates_are_in_range(key in any::<u64>(), nbuckets in bucket_count()) {
        let cands = candidates(&key, nbuckets);
        prop_assert!(cands.iter().all(|&b| b < nbuckets));

        for w in cands.chunks(PROBE_BUCKETS) {
            for pair in w.windows(2) {
                prop_assert_eq!(pair[1], (pair[0] + 1) % nbuckets);
            }
        }
    }

    /// The lock order is strictly ascending and covers every candidate.
    #[test]
    fn lock_order_is_sorted_and_distinct(key in any::<u64>(), nbuckets in bucket_count()) {
        let cands = candidates(&key, nbuckets);
        let (order, len) = lock_order(&cands);

        prop_assert!(len >= 1 && len <= CANDIDATES);
        prop_assert!(order[..len].windows(2).all(|w| w[0] < w[1]));
        prop_assert!(cands.iter().all(|c| order[..len].contains(c)));
    }
}
