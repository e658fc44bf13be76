//! Pedersen-commitment proof-of-storage primitives for the Custos network.
//!
//! This crate provides everything needed to bind a data chunk and a
//! per-challenge seed into verifiable evidence of possession:
//!
//! ```text
//! STORE PHASE:
//!   Ciphertext → Split into Chunks → BLAKE3 Hash Each → Build Merkle Tree
//!   Ciphertext + seed → Pedersen commitment (g·s + h·r) + chained hash
//!
//! CHALLENGE PHASE:
//!   fresh seed → deterministic chunk index → provider reveals chunk,
//!   Merkle proof, chunk commitment, and chain hashes → verifier checks all
//! ```
//!
//! The commitment group is NIST P-256 with a second generator `h` derived by
//! domain-separated hash-to-curve, so no party knows `log_g(h)`. Successive
//! challenge rounds are linked through `H(H(data || prev_seed) || seed)`,
//! which cannot be recomputed without the actual stored bytes.

pub mod challenge;
pub mod chunk;
pub mod commitment;
pub mod curve;
pub mod error;
pub mod merkle;

pub use challenge::{challenge_index, fresh_seed};
pub use chunk::{chunk_count, split_chunks};
pub use commitment::{
    chain_hash, chain_proof, commit, commit_value, verify_chain, verify_opening, Commitment,
};
pub use curve::{decode_point, decode_scalar, encode_point, encode_scalar, hash_to_scalar, CurveParameters};
pub use error::{PosError, Result};
pub use merkle::{hash_leaf, hash_node, tree_height, verify_proof, MerkleProof, MerkleTree};

/// Default chunk size in bytes (1 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
