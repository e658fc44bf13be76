//! Protocol messages exchanged between the coordinator and storage providers.
//!
//! One tagged variant exists per protocol phase (store, challenge, retrieve,
//! delete, plus the user-facing store/retrieve pair). Each response type
//! carries an Ed25519 signature over a fixed, ordered list of fields; the
//! signing bytes are produced by serializing a domain-separated tuple, so the
//! field order is part of the contract and any field added after signing
//! invalidates the signature.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::ContentId;

/// Domain separator for store response signatures.
const STORE_DOMAIN: &[u8] = b"CUSTOS_STORE_V1";
/// Domain separator for challenge response signatures.
const CHALLENGE_DOMAIN: &[u8] = b"CUSTOS_CHALLENGE_V1";
/// Domain separator for retrieve response signatures.
const RETRIEVE_DOMAIN: &[u8] = b"CUSTOS_RETRIEVE_V1";

/// Sign a message, returning the detached 64-byte signature.
fn sign_detached(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verify a detached signature produced by [`sign_detached`].
fn verify_detached(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Base64-encode bytes for the user-facing API.
pub fn b64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 from the user-facing API.
pub fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

// ============================================================================
// Store
// ============================================================================

/// Ask a provider to hold a ciphertext and return its initial commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Opaque ciphertext bytes to store.
    pub encrypted_data: Vec<u8>,
    /// Named curve for the commitment, e.g. `P-256`.
    pub curve: String,
    /// Base generator point (SEC1 compressed, hex).
    pub g: String,
    /// Second generator point with unknown discrete log relative to `g`.
    pub h: String,
    /// Hex-encoded random seed for the initial commitment round.
    pub seed: String,
}

impl StoreRequest {
    /// Content id the provider will file this ciphertext under.
    pub fn content_id(&self) -> ContentId {
        ContentId::identify(&self.encrypted_data)
    }
}

/// Provider acknowledgment of a store, carrying the initial commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Hex-encoded commitment randomness (scalar).
    pub randomness: String,
    /// Commitment point `g*s + h*r` (SEC1 compressed, hex).
    pub commitment: String,
    /// Chained commitment hash `H(H(data || prev_seed) || seed)` (hex).
    pub commitment_hash: String,
    /// Ed25519 signature over the fields required for hashing.
    pub signature: Vec<u8>,
}

impl StoreResponse {
    /// Fields required for hashing, serialized in fixed order.
    pub fn signing_bytes(&self, request: &StoreRequest) -> Vec<u8> {
        bincode::serialize(&(
            STORE_DOMAIN,
            &request.curve,
            &request.g,
            &request.h,
            &request.seed,
            &self.randomness,
            &self.commitment,
            &self.commitment_hash,
        ))
        .expect("signing tuple serializes")
    }

    pub fn sign(&mut self, request: &StoreRequest, key: &SigningKey) {
        self.signature = sign_detached(key, &self.signing_bytes(request));
    }

    pub fn verify_signature(&self, request: &StoreRequest, key: &VerifyingKey) -> bool {
        verify_detached(key, &self.signing_bytes(request), &self.signature)
    }
}

// ============================================================================
// Challenge
// ============================================================================

/// Which side of the path a proof sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingSide {
    Left,
    Right,
}

/// One sibling-hash/direction pair of a Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofStep {
    /// Side the sibling hash sits on when recombining toward the root.
    pub direction: SiblingSide,
    /// Hex-encoded sibling hash.
    pub hash: String,
}

/// Challenge a provider to prove possession of one chunk of a stored item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Content id of the ciphertext under challenge.
    pub challenge_hash: String,
    /// Chunk index to prove, derived deterministically from `seed`.
    pub challenge_index: u32,
    /// Chunk size in bytes the tree was built with.
    pub chunk_size: u32,
    /// Named curve for the commitment.
    pub curve: String,
    /// Base generator point (SEC1 compressed, hex).
    pub g: String,
    /// Second generator point (SEC1 compressed, hex).
    pub h: String,
    /// Fresh hex-encoded seed for this round.
    pub seed: String,
}

/// Provider response to a challenge round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Chained commitment hash `H(commitment_proof || seed)` (hex).
    pub commitment_hash: String,
    /// Chain link `H(data || prev_seed)` (hex).
    pub commitment_proof: String,
    /// Commitment point over the challenged chunk (SEC1 compressed, hex).
    pub commitment: String,
    /// The challenged chunk bytes, revealed for full verification.
    pub data_chunk: Vec<u8>,
    /// Hex-encoded commitment randomness for the chunk commitment.
    pub randomness: String,
    /// Sibling-hash/direction pairs from the chunk to the root.
    pub merkle_proof: Vec<MerkleProofStep>,
    /// Merkle root of the stored ciphertext's chunk tree (hex).
    pub merkle_root: String,
    /// Ed25519 signature over the fields required for hashing.
    pub signature: Vec<u8>,
}

impl ChallengeResponse {
    /// Fields required for hashing, serialized in fixed order.
    pub fn signing_bytes(&self, request: &ChallengeRequest) -> Vec<u8> {
        bincode::serialize(&(
            CHALLENGE_DOMAIN,
            &request.challenge_hash,
            request.challenge_index,
            request.chunk_size,
            &request.seed,
            &self.commitment_hash,
            &self.commitment_proof,
            &self.commitment,
            &self.data_chunk,
            &self.randomness,
            &self.merkle_proof,
            &self.merkle_root,
        ))
        .expect("signing tuple serializes")
    }

    pub fn sign(&mut self, request: &ChallengeRequest, key: &SigningKey) {
        self.signature = sign_detached(key, &self.signing_bytes(request));
    }

    pub fn verify_signature(&self, request: &ChallengeRequest, key: &VerifyingKey) -> bool {
        verify_detached(key, &self.signing_bytes(request), &self.signature)
    }
}

// ============================================================================
// Retrieve
// ============================================================================

/// Fetch a stored ciphertext back, extending the commitment chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// Content id of the ciphertext to fetch.
    pub data_hash: String,
    /// Fresh hex-encoded seed to hash the data with.
    pub seed: String,
}

/// Provider response to a retrieve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    /// The stored ciphertext bytes.
    pub data: Vec<u8>,
    /// Chained commitment hash `H(commitment_proof || seed)` (hex).
    pub commitment_hash: String,
    /// Chain link `H(data || prev_seed)` (hex).
    pub commitment_proof: String,
    /// Ed25519 signature over the fields required for hashing.
    pub signature: Vec<u8>,
}

impl RetrieveResponse {
    /// Fields required for hashing, serialized in fixed order.
    pub fn signing_bytes(&self, request: &RetrieveRequest) -> Vec<u8> {
        bincode::serialize(&(
            RETRIEVE_DOMAIN,
            &request.data_hash,
            &request.seed,
            &self.data,
            &self.commitment_proof,
            &self.commitment_hash,
        ))
        .expect("signing tuple serializes")
    }

    pub fn sign(&mut self, request: &RetrieveRequest, key: &SigningKey) {
        self.signature = sign_detached(key, &self.signing_bytes(request));
    }

    pub fn verify_signature(&self, request: &RetrieveRequest, key: &VerifyingKey) -> bool {
        verify_detached(key, &self.signing_bytes(request), &self.signature)
    }
}

// ============================================================================
// Delete
// ============================================================================

/// Drop a stored ciphertext and its chain state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Content id of the ciphertext to delete.
    pub data_hash: String,
}

/// Provider acknowledgment of a delete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// True if the provider held a copy and removed it.
    pub deleted: bool,
}

// ============================================================================
// User-facing messages (network-custodial variant)
// ============================================================================

/// Store already-encrypted user data; the network re-wraps under its own key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreUserRequest {
    /// Base64-encoded user ciphertext.
    pub encrypted_data: String,
    /// Serialized envelope descriptor for the user's own encryption.
    pub encryption_payload: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreUserResponse {
    /// Storage lookup key for later retrieval.
    pub data_hash: String,
}

/// Retrieve user data previously stored via [`StoreUserRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveUserRequest {
    /// Storage lookup key returned at store time.
    pub data_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveUserResponse {
    /// Base64-encoded user ciphertext, exactly as originally stored.
    pub encrypted_data: String,
    /// The user's original envelope descriptor.
    pub encryption_payload: String,
}

// ============================================================================
// Tagged protocol envelopes
// ============================================================================

/// Messages sent coordinator → provider over the provider RPC endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderRequest {
    Store(StoreRequest),
    Challenge(ChallengeRequest),
    Retrieve(RetrieveRequest),
    Delete(DeleteRequest),
}

/// Messages returned provider → coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderResponse {
    Store(StoreResponse),
    Challenge(ChallengeResponse),
    Retrieve(RetrieveResponse),
    Delete(DeleteResponse),
    /// Provider-side failure; the message is diagnostic only.
    Error { message: String },
}
