//! Error types for the pos-commitments crate.

use thiserror::Error;

/// Result type alias using PosError
pub type Result<T> = std::result::Result<T, PosError>;

/// Errors that can occur in proof-of-storage operations
#[derive(Error, Debug)]
pub enum PosError {
    /// Malformed curve point, non-canonical scalar, or broken chain hash
    #[error("invalid commitment: {0}")]
    InvalidCommitment(String),

    /// Merkle proof fails to reconcile with the expected root
    #[error("merkle proof mismatch: {0}")]
    ProofMismatch(String),

    /// Invalid chunk size (must be > 0)
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),

    /// Invalid chunk index in challenge
    #[error("chunk index {index} out of bounds (max: {max})")]
    ChunkIndexOutOfBounds { index: u32, max: u32 },

    /// Curve name outside the deployment's fixed parameters
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// Empty data
    #[error("cannot process empty data")]
    EmptyData,
}
