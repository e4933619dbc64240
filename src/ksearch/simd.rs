//! Batched fingerprint comparison.
//!
//! A bucket stores [`BUCKET_SLOTS`] one-byte fingerprints. Finding the slots
//! whose fingerprint equals a target is one vector compare on `x86_64` (SSE2
//! is part of the baseline, so no runtime detection is needed) and a SWAR
//! scan elsewhere. Both return a bitmask with bit `i` set for slot `i`; the
//! lowest set bit is the first match, so every implementation agrees on
//! tie-breaking.

use crate::config::BUCKET_SLOTS;

/// Bitmask over bucket slots.
pub type SlotMask = u16;

const _: () = assert!(BUCKET_SLOTS == 16, "SlotMask holds exactly 16 slots");

/// Mask of slots whose fingerprint equals `target`.
#[inline]
#[must_use]
pub fn match_mask(fingerprints: &[u8; BUCKET_SLOTS], target: u8) -> SlotMask {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2", not(miri)))]
    {
        // SAFETY: SSE2 is statically enabled for this target.
        unsafe { sse2_impl::match_mask_sse2(fingerprints, target) }
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2", not(miri))))]
    {
        match_mask_swar(fingerprints, target)
    }
}

/// Index of the lowest set bit, if any.
#[inline]
#[must_use]
pub const fn first_slot(mask: SlotMask) -> Option<usize> {
    if mask == 0 {
        None
    } else {
        Some(mask.trailing_zeros() as usize)
    }
}

/// Iterate the set bits of a mask from lowest to highest.
#[inline]
pub fn slots(mut mask: SlotMask) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        let slot: usize = first_slot(mask)?;
        mask &= mask - 1;
        Some(slot)
    })
}

// ============================================================================
//  Portable fallback
// ============================================================================

const LOW_BITS: u64 = 0x0101_0101_0101_0101;
const HIGH_BITS: u64 = 0x8080_8080_8080_8080;

/// SWAR compare of eight bytes at a time.
#[inline]
#[must_use]
pub fn match_mask_swar(fingerprints: &[u8; BUCKET_SLOTS], target: u8) -> SlotMask {
    let broadcast: u64 = LOW_BITS * u64::from(target);
    let mut mask: SlotMask = 0;

    for (half, chunk) in fingerprints.chunks_exact(8).enumerate() {
        let mut word_bytes = [0u8; 8];
        word_bytes.copy_from_slice(chunk);

        // Zero bytes of `diff` are the matches. Exact per-byte zero test
        // (no borrow propagation false positives).
        let diff: u64 = u64::from_le_bytes(word_bytes) ^ broadcast;
        let zeros: u64 = !(((diff & !HIGH_BITS) + !HIGH_BITS) | diff | !HIGH_BITS);

        for byte in 0..8 {
            if zeros & (0x80 << (byte * 8)) != 0 {
                mask |= 1 << (half * 8 + byte);
            }
        }
    }

    mask
}

/// Plain byte loop, the reference for the other implementations.
#[inline]
#[must_use]
pub fn match_mask_scalar(fingerprints: &[u8; BUCKET_SLOTS], target: u8) -> SlotMask {
    fingerprints
        .iter()
        .enumerate()
        .filter(|&(_, &fp)| fp == target)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

// ============================================================================
//  SSE2 Implementation (x86_64 baseline)
// ============================================================================

#[cfg(all(target_arch = "x86_64", target_feature = "sse2", not(miri)))]
mod sse2_impl {
    use std::arch::x86_64::{_mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi8};

    use super::{BUCKET_SLOTS, SlotMask};

    /// Compare all sixteen fingerprints in one instruction.
    ///
    /// # Safety
    /// Requires SSE2, which the caller guarantees via `cfg`.
    #[inline]
    #[target_feature(enable = "sse2")]
    #[expect(clippy::cast_possible_wrap, reason = "bit pattern reinterpretation")]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "movemask fits 16 bits")]
    pub unsafe fn match_mask_sse2(fingerprints: &[u8; BUCKET_SLOTS], target: u8) -> SlotMask {
        // SAFETY: the array is exactly 16 bytes; unaligned load is allowed.
        unsafe {
            let lanes = _mm_loadu_si128(fingerprints.as_ptr().cast());
            let needle = _mm_set1_epi8(target as i8);
            _mm_movemask_epi8(_mm_cmpeq_epi8(lanes, needle)) as SlotMask
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [u8; BUCKET_SLOTS] {
        [0, 7, 3, 7, 0, 0, 0xFF, 1, 7, 0, 0, 0, 0x80, 0x7F, 0, 7]
    }

    #[test]
    fn test_implementations_agree() {
        let fps = sample();
        for target in 0..=u8::MAX {
            let reference = match_mask_scalar(&fps, target);
            assert_eq!(match_mask_swar(&fps, target), reference, "target={target}");
            assert_eq!(match_mask(&fps, target), reference, "target={target}");
        }
    }

    #[test]
    fn test_lowest_index_wins() {
        let fps = sample();
        assert_eq!(first_slot(match_mask(&fps, 7)), Some(1));
        assert_eq!(first_slot(match_mask(&fps, 0)), Some(0));
        assert_eq!(first_slot(match_mask(&fps, 42)), None);
    }

    #[test]
    fn test_slots_iterates_in_order() {
        let fps = sample();
        let found: Vec<usize> = slots(match_mask(&fps, 7)).collect();
        assert_eq!(found, vec![1, 3, 8, 15]);
    }

    #[test]
    fn test_swar_high_bit_bytes() {
        // 0x80 and 0x7F differ only around the borrow boundary.
        let mut fps = [0x80u8; BUCKET_SLOTS];
        fps[5] = 0x7F;
        assert_eq!(match_mask_swar(&fps, 0x7F), 1 << 5);
        assert_eq!(match_mask_swar(&fps, 0x80), !(1 << 5));
    }
}
