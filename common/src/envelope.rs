//! Encryption envelope descriptors.
//!
//! An envelope pairs ciphertext with the parameters needed to reverse the
//! encryption. Only the descriptor half is serializable; it is persisted in
//! the coordinator's payload store under `payload:<scope>:<content_id>` and
//! travels in the user-facing messages. Key material itself never appears
//! here.

use serde::{Deserialize, Serialize};

/// AEAD algorithm identifier for custodial envelopes.
pub const XCHACHA20_POLY1305: &str = "xchacha20-poly1305";

/// Serializable descriptor of one encryption operation.
///
/// Sufficient, together with the right key material, to reverse the
/// encryption. The `salt` feeds per-item key derivation, so two envelopes for
/// different content ids never share a derived key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPayload {
    /// AEAD algorithm name, e.g. `xchacha20-poly1305`.
    pub algorithm: String,
    /// Hex-encoded 24-byte nonce, unique per encryption.
    pub nonce: String,
    /// Hex-encoded HKDF salt for the per-item key.
    pub salt: String,
}

impl EncryptionPayload {
    /// Serialize to the JSON form persisted in the payload store.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Ciphertext plus the descriptor needed to reverse it.
#[derive(Clone, Debug)]
pub struct EncryptionEnvelope {
    pub ciphertext: Vec<u8>,
    pub payload: EncryptionPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json_roundtrip() {
        let payload = EncryptionPayload {
            algorithm: XCHACHA20_POLY1305.to_string(),
            nonce: "ab".repeat(24),
            salt: "cd".repeat(32),
        };
        let json = payload.to_json().unwrap();
        assert_eq!(EncryptionPayload::from_json(&json).unwrap(), payload);
    }
}
