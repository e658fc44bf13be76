//! Shared types for the Custos storage network.
//!
//! This crate provides functionality used by both the coordinator and the
//! storage providers:
//! - **Content addressing**: BLAKE3-derived identifiers for byte payloads
//! - **Protocol messages**: store/challenge/retrieve request and response
//!   pairs with deterministic required-field signing
//! - **Encryption payload descriptors**: the serializable half of an
//!   encryption envelope, persisted per content id and scope
//!
//! # Key Design Principles
//!
//! - **Closed message set**: one tagged variant per protocol phase, each with
//!   a fixed field list used for signing. No incrementally-filled optional
//!   fields on a shared mutable object.
//! - **Deterministic signing bytes**: fields required for a signature are
//!   serialized in declared order; anything added after signing invalidates
//!   the signature.

pub mod envelope;
pub mod messages;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic identifier for a byte payload: hex-encoded BLAKE3 digest.
///
/// Created once at ingestion and immutable afterwards. The same identifier
/// scheme is used for ciphertext at the network boundary and, separately, for
/// the original payload kept by the storing party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derive the content id for a byte sequence.
    pub fn identify(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Parse a previously-derived content id from its hex form.
    ///
    /// Rejects strings that are not exactly 64 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, ContentIdError> {
        if s.len() != 64 {
            return Err(ContentIdError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(ContentIdError::NotHex);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error parsing a [`ContentId`] from its string form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("content id must be 64 hex characters, got {0}")]
    Length(usize),
    #[error("content id contains non-hex characters")]
    NotHex,
}

/// Identity of a storage provider: its hex-encoded Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Build a provider id from a verifying key.
    pub fn from_verifying_key(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(hex::encode(key.to_bytes()))
    }

    /// Wrap an already hex-encoded public key.
    pub fn from_hex(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to a verifying key, if the hex is a valid Ed25519 point.
    pub fn verifying_key(&self) -> Option<ed25519_dalek::VerifyingKey> {
        let bytes: [u8; 32] = hex::decode(&self.0).ok()?.try_into().ok()?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes).ok()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope under which an encryption payload descriptor is persisted.
///
/// Network-custodial and user-facing payloads for the same content id are
/// never interchangeable; the scope keeps their KV entries disjoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadScope {
    /// Payload for the coordinator-held custodial envelope.
    Network,
    /// Opaque payload supplied by the end user, returned on retrieval.
    User,
}

impl PayloadScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadScope::Network => "network",
            PayloadScope::User => "user",
        }
    }

    /// KV key for a payload descriptor: `payload:<scope>:<content_id>`.
    pub fn payload_key(&self, content_id: &ContentId) -> String {
        format!("payload:{}:{}", self.as_str(), content_id)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_deterministic() {
        let a = ContentId::identify(b"hello world");
        let b = ContentId::identify(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_identify_distinct_inputs() {
        let a = ContentId::identify(b"hello world");
        let b = ContentId::identify(b"hello world!");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = ContentId::identify(b"payload");
        let parsed = ContentId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            ContentId::parse("abc").unwrap_err(),
            ContentIdError::Length(3)
        );
        let not_hex = "g".repeat(64);
        assert_eq!(ContentId::parse(&not_hex).unwrap_err(), ContentIdError::NotHex);
    }

    #[test]
    fn test_payload_keys_disjoint_by_scope() {
        let id = ContentId::identify(b"x");
        let network = PayloadScope::Network.payload_key(&id);
        let user = PayloadScope::User.payload_key(&id);
        assert_ne!(network, user);
        assert!(network.starts_with("payload:network:"));
        assert!(user.starts_with("payload:user:"));
    }

    #[test]
    fn test_provider_id_roundtrip() {
        use ed25519_dalek::SigningKey;
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let id = ProviderId::from_verifying_key(&key.verifying_key());
        assert_eq!(id.verifying_key().unwrap(), key.verifying_key());
    }
}
