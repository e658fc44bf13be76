//! Pedersen commitments with a seed-chained hash.
//!
//! A commitment binds a data payload and a per-challenge random seed into a
//! single group element `g·s + h·r` plus a re-verifiable hash chain:
//!
//! ```text
//! commitment_proof = H(data || prev_seed)
//! commitment_hash  = H(commitment_proof || seed)
//! ```
//!
//! The chain links each round to the previous one: a verifier holding only
//! the latest `(seed, commitment_hash)` pair can still detect a provider that
//! discarded the data between challenges, because extending the chain
//! requires the actual stored bytes. `prev_seed` is empty for the initial
//! store-time round.
//!
//! Verification here is the full-reveal mode: the challenged bytes are
//! revealed and the verifier recomputes the commitment point for exact
//! equality. [`verify_chain`] covers the hash-only linkage check.

use p256::elliptic_curve::Field;
use p256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;

use crate::curve::{encode_point, encode_scalar, hash_to_scalar, CurveParameters};

/// One round's commitment: the seed it answers, the blinding randomness, the
/// commitment point, and the chained hashes.
#[derive(Clone, Debug)]
pub struct Commitment {
    /// Verifier-supplied seed for this round.
    pub seed: Vec<u8>,
    /// Blinding scalar drawn uniformly from the field.
    pub randomness: Scalar,
    /// `g·s + h·r` where `s` is the data scalar.
    pub point: ProjectivePoint,
    /// Chain link `H(data || prev_seed)`.
    pub proof: [u8; 32],
    /// Chained hash `H(proof || seed)`.
    pub hash: [u8; 32],
}

impl Commitment {
    pub fn randomness_hex(&self) -> String {
        encode_scalar(&self.randomness)
    }

    pub fn point_hex(&self) -> String {
        encode_point(&self.point)
    }

    pub fn proof_hex(&self) -> String {
        hex::encode(self.proof)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Blind a payload into a commitment point with fresh randomness.
///
/// Returns the blinding scalar and `g·s + h·r`. Used directly when the
/// committed payload (a single chunk) differs from the payload the hash
/// chain runs over (the whole ciphertext).
pub fn commit_value(data: &[u8], params: &CurveParameters) -> (Scalar, ProjectivePoint) {
    let data_scalar = hash_to_scalar(data);
    let randomness = Scalar::random(&mut OsRng);
    let point = *params.g() * data_scalar + *params.h() * randomness;
    (randomness, point)
}

/// Commit to `data` for one challenge round.
///
/// `prev_seed` is the previous round's seed, or empty for the initial round.
/// Randomness is drawn fresh from the OS RNG; commitments are never reused
/// across rounds.
pub fn commit(
    data: &[u8],
    seed: &[u8],
    prev_seed: &[u8],
    params: &CurveParameters,
) -> Commitment {
    let (randomness, point) = commit_value(data, params);
    let proof = chain_proof(data, prev_seed);
    let hash = chain_hash(&proof, seed);

    Commitment {
        seed: seed.to_vec(),
        randomness,
        point,
        proof,
        hash,
    }
}

/// Chain link for one round: `H(data || prev_seed)`.
pub fn chain_proof(data: &[u8], prev_seed: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.update(prev_seed);
    *hasher.finalize().as_bytes()
}

/// Chained commitment hash: `H(proof || seed)`.
pub fn chain_hash(proof: &[u8; 32], seed: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(proof);
    hasher.update(seed);
    *hasher.finalize().as_bytes()
}

/// Full-reveal verification: recompute `g·s + h·r` from the revealed data
/// and claimed randomness, compare for exact point equality.
pub fn verify_opening(
    data: &[u8],
    randomness: &Scalar,
    point: &ProjectivePoint,
    params: &CurveParameters,
) -> bool {
    let data_scalar = hash_to_scalar(data);
    *params.g() * data_scalar + *params.h() * *randomness == *point
}

/// Hash-only linkage check: does `H(proof || seed)` reproduce the claimed
/// commitment hash? Used where the verifier must not (or cannot) see the
/// full data behind `proof`.
pub fn verify_chain(proof: &[u8; 32], seed: &[u8], expected_hash: &[u8; 32]) -> bool {
    chain_hash(proof, seed) == *expected_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{decode_point, decode_scalar};

    #[test]
    fn test_commit_and_open() {
        let params = CurveParameters::p256();
        let commitment = commit(b"stored chunk", b"seed-1", b"", &params);

        assert!(verify_opening(
            b"stored chunk",
            &commitment.randomness,
            &commitment.point,
            &params
        ));
        // Wrong data must fail, hard.
        assert!(!verify_opening(
            b"stored chunk!",
            &commitment.randomness,
            &commitment.point,
            &params
        ));
    }

    #[test]
    fn test_opening_fails_with_wrong_randomness() {
        let params = CurveParameters::p256();
        let commitment = commit(b"data", b"seed", b"", &params);
        let other = commit(b"data", b"seed", b"", &params);

        // Two commitments to the same data use different randomness, so the
        // openings are not interchangeable.
        assert_ne!(
            encode_scalar(&commitment.randomness),
            encode_scalar(&other.randomness)
        );
        assert!(!verify_opening(
            b"data",
            &other.randomness,
            &commitment.point,
            &params
        ));
    }

    #[test]
    fn test_commitment_roundtrips_through_wire_form() {
        let params = CurveParameters::p256();
        let commitment = commit(b"payload", b"seed", b"", &params);

        let point = decode_point(&commitment.point_hex()).unwrap();
        let randomness = decode_scalar(&commitment.randomness_hex()).unwrap();
        assert!(verify_opening(b"payload", &randomness, &point, &params));
    }

    #[test]
    fn test_chain_links_successive_rounds() {
        let data = b"the stored bytes";
        let round1 = commit(data, b"seed-1", b"", &CurveParameters::p256());
        let round2 = commit(data, b"seed-2", b"seed-1", &CurveParameters::p256());

        assert!(verify_chain(&round1.proof, b"seed-1", &round1.hash));
        assert!(verify_chain(&round2.proof, b"seed-2", &round2.hash));

        // Round 2's hash depends on round 1's seed through the proof.
        assert_ne!(round1.proof, round2.proof);
        assert_ne!(round1.hash, round2.hash);

        // Replaying round 1's proof against round 2's seed fails linkage.
        assert!(!verify_chain(&round1.proof, b"seed-2", &round2.hash));
    }

    #[test]
    fn test_chain_requires_actual_data() {
        let honest = chain_proof(b"the stored bytes", b"seed-1");
        let discarded = chain_proof(b"", b"seed-1");
        assert_ne!(honest, discarded);
    }

    #[test]
    fn test_hiding_across_seeds() {
        // Same data, different rounds: every wire-visible field changes.
        let params = CurveParameters::p256();
        let a = commit(b"data", b"seed-a", b"", &params);
        let b = commit(b"data", b"seed-b", b"seed-a", &params);
        assert_ne!(a.point_hex(), b.point_hex());
        assert_ne!(a.hash_hex(), b.hash_hex());
    }
}
