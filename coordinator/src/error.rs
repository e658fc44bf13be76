//! Error taxonomy for coordinator operations.
//!
//! Commitment and proof failures carry the content id, provider, and round
//! seed so reliability accounting upstream can attribute them; they are never
//! silently downgraded. Every public operation resolves to success or one
//! concrete error kind.

use common::{ContentId, ProviderId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// A provider returned a malformed or non-verifying commitment
    #[error("invalid commitment from {provider} for {content_id} (seed {seed}): {reason}")]
    InvalidCommitment {
        content_id: ContentId,
        provider: ProviderId,
        seed: String,
        reason: String,
    },

    /// A Merkle proof failed to reconcile with the expected root
    #[error("merkle proof mismatch from {provider} for {content_id} (seed {seed})")]
    ProofMismatch {
        content_id: ContentId,
        provider: ProviderId,
        seed: String,
    },

    /// Envelope authentication failed; no plaintext was produced
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// No provider returned valid data for a content id
    #[error("no provider returned valid data for {0}")]
    DataUnavailable(ContentId),

    /// A provider did not answer within the configured bound
    #[error("provider {provider} timed out after {timeout_secs}s")]
    Timeout {
        provider: ProviderId,
        timeout_secs: u64,
    },

    /// A store failed to reach the configured redundancy threshold.
    /// Provider-level sub-failures are attached for diagnostics.
    #[error("store quorum not met for {content_id}: {acked}/{required} acknowledgments")]
    QuorumNotMet {
        content_id: ContentId,
        required: usize,
        acked: usize,
        failures: Vec<(ProviderId, String)>,
    },

    /// No placement record exists for the content id
    #[error("no placement record for {0}")]
    UnknownContent(ContentId),

    /// A challenge round is already in flight for this pair; rounds for a
    /// (content id, provider) pair are strictly sequential
    #[error("challenge round already in flight for {content_id} on {provider}")]
    RoundInFlight {
        content_id: ContentId,
        provider: ProviderId,
    },

    /// Refusing to store a zero-length payload
    #[error("cannot store an empty payload")]
    EmptyPayload,

    /// Commitment or Merkle layer rejected local inputs
    #[error(transparent)]
    Pos(#[from] pos_commitments::PosError),

    /// Underlying sled failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for CoordinatorError {
    fn from(err: sled::Error) -> Self {
        CoordinatorError::Storage(err.to_string())
    }
}
