//! Stripe layout and parity codec.
//!
//! Pure, deterministic functions over byte buffers: parity XOR, stripe
//! counting, parity-disk rotation, padding, and single-bit error injection.
//! None of this module performs I/O; callers own sockets and files.

use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StripeError {
    #[error("block length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Byte-wise XOR of a set of equal-length blocks. Empty input yields an empty buffer.
pub fn parity(blocks: &[Vec<u8>]) -> Result<Vec<u8>, StripeError> {
    let mut iter = blocks.iter();
    let Some(first) = iter.next() else {
        return Ok(Vec::new());
    };

    let mut acc = first.clone();
    for block in iter {
        if block.len() != acc.len() {
            return Err(StripeError::LengthMismatch {
                expected: acc.len(),
                actual: block.len(),
            });
        }
        for (a, b) in acc.iter_mut().zip(block.iter()) {
            *a ^= b;
        }
    }
    Ok(acc)
}

/// Number of stripes needed to hold a file of `file_size` bytes across
/// `n` disks with one parity disk per stripe and striping unit `unit`.
pub fn stripe_count(file_size: u64, n: u32, unit: u32) -> u64 {
    let data_bytes_per_stripe = (n as u64 - 1) * unit as u64;
    if file_size == 0 {
        return 0;
    }
    file_size.div_ceil(data_bytes_per_stripe)
}

/// The disk index holding the parity block for stripe `s` in a DSS of width `n`.
/// Parity rotates opposite the stripe index, wrapping every `n` stripes.
pub fn parity_index(stripe: u64, n: u32) -> u32 {
    n - 1 - (stripe % n as u64) as u32
}

/// Truncate or zero-pad `data` to exactly `unit` bytes.
pub fn pad(data: &[u8], unit: u32) -> Vec<u8> {
    let unit = unit as usize;
    if data.len() >= unit {
        return data[..unit].to_vec();
    }
    let mut padded = data.to_vec();
    padded.resize(unit, 0);
    padded
}

/// Flip one uniformly random bit in a copy of `block`. Callers supply the
/// RNG so tests can reproduce a specific corruption.
pub fn inject_flip(block: &[u8], rng: &mut impl Rng) -> Vec<u8> {
    if block.is_empty() {
        return block.to_vec();
    }
    let mut corrupted = block.to_vec();
    let byte_index = rng.gen_range(0..corrupted.len());
    let bit_position = rng.gen_range(0..8u32);
    corrupted[byte_index] ^= 1 << bit_position;
    corrupted
}

/// True iff the XOR of `data_blocks` equals `parity_block`.
pub fn verify(data_blocks: &[Vec<u8>], parity_block: &[u8]) -> bool {
    match parity(data_blocks) {
        Ok(computed) => computed == parity_block,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parity_is_xor_identity() {
        let a = vec![0b1010_1010u8, 0x00];
        let b = vec![0b0101_0101u8, 0xff];
        let p = parity(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(p, vec![0xff, 0xff]);
        assert!(verify(&[a, b], &p));
    }

    #[test]
    fn parity_of_empty_input_is_empty() {
        assert_eq!(parity(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parity_rejects_length_mismatch() {
        let a = vec![0u8; 4];
        let b = vec![0u8; 3];
        assert_eq!(
            parity(&[a, b]).unwrap_err(),
            StripeError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn stripe_count_matches_ceiling_division() {
        // S1: n=3, U=128 -> 256 data bytes/stripe, 200-byte file -> 1 stripe
        assert_eq!(stripe_count(200, 3, 128), 1);
        // S2: n=3, U=128, 300-byte file -> ceil(300/256) = 2 stripes
        assert_eq!(stripe_count(300, 3, 128), 2);
        assert_eq!(stripe_count(0, 3, 128), 0);
    }

    #[test]
    fn stripe_count_bounds_hold() {
        for file_size in [1u64, 127, 128, 255, 256, 257, 1_048_576] {
            let n = 4;
            let unit = 128;
            let s = stripe_count(file_size, n, unit);
            let data_per_stripe = (n as u64 - 1) * unit as u64;
            assert!(s * data_per_stripe >= file_size);
            assert!(s * data_per_stripe < file_size + data_per_stripe);
        }
    }

    #[test]
    fn parity_index_rotates_through_every_disk() {
        for n in 3u32..8 {
            let positions: std::collections::BTreeSet<u32> =
                (0..n as u64).map(|s| parity_index(s, n)).collect();
            let expected: std::collections::BTreeSet<u32> = (0..n).collect();
            assert_eq!(positions, expected);
        }
    }

    #[test]
    fn parity_index_matches_scenario_s2() {
        assert_eq!(parity_index(0, 3), 2);
        assert_eq!(parity_index(1, 3), 1);
    }

    #[test]
    fn pad_truncates_and_extends() {
        assert_eq!(pad(&[1, 2, 3, 4, 5], 3), vec![1, 2, 3]);
        assert_eq!(pad(&[1, 2], 5), vec![1, 2, 0, 0, 0]);
        assert_eq!(pad(&[], 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn inject_flip_changes_exactly_one_bit() {
        let mut rng = StdRng::seed_from_u64(42);
        let block = vec![0u8; 16];
        let flipped = inject_flip(&block, &mut rng);
        let diff_bits: u32 = block
            .iter()
            .zip(flipped.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(diff_bits, 1);
    }

    #[test]
    fn inject_flip_is_reproducible_with_same_seed() {
        let block = vec![5u8; 8];
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        assert_eq!(inject_flip(&block, &mut rng_a), inject_flip(&block, &mut rng_b));
    }
}
