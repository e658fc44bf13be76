//! Challenge seed and chunk-index selection.
//!
//! The verifier supplies a fresh random seed per round; the challenged chunk
//! index is derived from that seed deterministically, so both sides agree on
//! which chunk is in question without an extra round trip.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{PosError, Result};

/// Draw a fresh 32-byte challenge seed from the OS RNG.
pub fn fresh_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Derive the challenged chunk index for a round: BLAKE3(seed) reduced
/// modulo the chunk count.
pub fn challenge_index(seed: &[u8], chunk_count: u32) -> Result<u32> {
    if chunk_count == 0 {
        return Err(PosError::EmptyData);
    }
    let digest = blake3::hash(seed);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    Ok((u64::from_le_bytes(word) % u64::from(chunk_count)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_deterministic() {
        let seed = [42u8; 32];
        assert_eq!(
            challenge_index(&seed, 64).unwrap(),
            challenge_index(&seed, 64).unwrap()
        );
    }

    #[test]
    fn test_index_in_range() {
        for byte in 0u8..32 {
            let seed = [byte; 32];
            let idx = challenge_index(&seed, 7).unwrap();
            assert!(idx < 7);
        }
    }

    #[test]
    fn test_index_varies_with_seed() {
        // Over a large enough index space, distinct seeds should not all
        // collapse onto one index.
        let indices: std::collections::HashSet<u32> = (0u8..16)
            .map(|b| challenge_index(&[b; 32], 1024).unwrap())
            .collect();
        assert!(indices.len() > 1);
    }

    #[test]
    fn test_zero_chunk_count_rejected() {
        assert!(challenge_index(&[1u8; 32], 0).is_err());
    }

    #[test]
    fn test_fresh_seeds_differ() {
        assert_ne!(fresh_seed(), fresh_seed());
    }
}
