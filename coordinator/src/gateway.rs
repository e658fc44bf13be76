//! Encryption gateway at the user/network trust boundary.
//!
//! Data crossing into the network is re-encrypted under a key only the
//! coordinator holds, so the network stores ciphertext under network-held key
//! material distinct from anything the user keeps. Per-item keys are derived
//! with HKDF-SHA256 from the custodial secret, a random salt, and the content
//! id; the content id is also the AEAD associated data, so the envelope for
//! item X can never satisfy a request for item Y.
//!
//! Payload descriptors are persisted under `payload:<scope>:<content_id>`,
//! with the network-custodial and user-facing scopes kept disjoint.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use common::envelope::{EncryptionEnvelope, EncryptionPayload, XCHACHA20_POLY1305};
use common::{ContentId, PayloadScope};

use crate::error::{CoordinatorError, Result};

/// Re-encrypts data at the trust boundary and keeps payload descriptors.
pub struct EncryptionGateway {
    custodial_secret: [u8; 32],
    payloads: sled::Tree,
}

impl EncryptionGateway {
    pub fn new(custodial_secret: [u8; 32], payloads: sled::Tree) -> Self {
        Self {
            custodial_secret,
            payloads,
        }
    }

    /// Derive the per-item key from the custodial secret, salt, and content id.
    fn derive_key(&self, salt: &[u8], content_id: &ContentId) -> [u8; 32] {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), &self.custodial_secret);
        let mut key = [0u8; 32];
        hkdf.expand(content_id.as_str().as_bytes(), &mut key)
            .expect("32 bytes is a valid HKDF output length");
        key
    }

    /// Encrypt plaintext under the network-custodial key for `content_id`.
    pub fn wrap(&self, plaintext: &[u8], content_id: &ContentId) -> Result<EncryptionEnvelope> {
        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; 24];
        OsRng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt, content_id);
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CoordinatorError::Decryption(format!("cipher init: {e}")))?;
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: content_id.as_str().as_bytes(),
                },
            )
            .map_err(|e| CoordinatorError::Decryption(format!("encryption failed: {e}")))?;

        debug!(content_id = %content_id, bytes = plaintext.len(), "Wrapped payload");
        Ok(EncryptionEnvelope {
            ciphertext,
            payload: EncryptionPayload {
                algorithm: XCHACHA20_POLY1305.to_string(),
                nonce: hex::encode(nonce),
                salt: hex::encode(salt),
            },
        })
    }

    /// Decrypt an envelope wrapped for `content_id`.
    ///
    /// Fails with a decryption error on tag or key-material mismatch; no
    /// partial plaintext is ever returned.
    pub fn unwrap(&self, envelope: &EncryptionEnvelope, content_id: &ContentId) -> Result<Vec<u8>> {
        if envelope.payload.algorithm != XCHACHA20_POLY1305 {
            return Err(CoordinatorError::Decryption(format!(
                "unsupported algorithm {}",
                envelope.payload.algorithm
            )));
        }
        let nonce = decode_fixed::<24>(&envelope.payload.nonce, "nonce")?;
        let salt = decode_fixed::<32>(&envelope.payload.salt, "salt")?;

        let key = self.derive_key(&salt, content_id);
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CoordinatorError::Decryption(format!("cipher init: {e}")))?;
        cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &envelope.ciphertext,
                    aad: content_id.as_str().as_bytes(),
                },
            )
            .map_err(|_| {
                CoordinatorError::Decryption("authentication tag mismatch".to_string())
            })
    }

    /// Persist a payload descriptor under its scope.
    pub fn persist_payload(
        &self,
        scope: PayloadScope,
        content_id: &ContentId,
        payload: &str,
    ) -> Result<()> {
        self.payloads
            .insert(scope.payload_key(content_id).as_bytes(), payload.as_bytes())?;
        Ok(())
    }

    /// Load a payload descriptor previously persisted under its scope.
    pub fn load_payload(
        &self,
        scope: PayloadScope,
        content_id: &ContentId,
    ) -> Result<Option<String>> {
        Ok(self
            .payloads
            .get(scope.payload_key(content_id).as_bytes())?
            .map(|ivec| String::from_utf8_lossy(&ivec).to_string()))
    }

    /// Remove both scopes' payload descriptors for a deleted item.
    pub fn remove_payloads(&self, content_id: &ContentId) -> Result<()> {
        self.payloads
            .remove(PayloadScope::Network.payload_key(content_id).as_bytes())?;
        self.payloads
            .remove(PayloadScope::User.payload_key(content_id).as_bytes())?;
        Ok(())
    }
}

fn decode_fixed<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N]> {
    hex::decode(hex_str)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| {
            CoordinatorError::Decryption(format!("{field} must be {N} hex-encoded bytes"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_gateway(secret: [u8; 32]) -> (EncryptionGateway, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("payloads.db")).unwrap();
        let tree = db.open_tree("payloads").unwrap();
        (EncryptionGateway::new(secret, tree), dir)
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let plaintext = b"user data crossing the boundary";
        let content_id = ContentId::identify(plaintext);

        let envelope = gateway.wrap(plaintext, &content_id).unwrap();
        assert_ne!(envelope.ciphertext, plaintext.to_vec());
        assert_eq!(gateway.unwrap(&envelope, &content_id).unwrap(), plaintext);
    }

    #[test]
    fn test_unwrap_wrong_key_material_fails() {
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let (other, _dir2) = test_gateway([2u8; 32]);
        let content_id = ContentId::identify(b"data");

        let envelope = gateway.wrap(b"data", &content_id).unwrap();
        assert!(matches!(
            other.unwrap(&envelope, &content_id),
            Err(CoordinatorError::Decryption(_))
        ));
    }

    #[test]
    fn test_envelope_bound_to_content_id() {
        // The envelope for item X must never satisfy a request for item Y.
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let id_x = ContentId::identify(b"item x");
        let id_y = ContentId::identify(b"item y");

        let envelope = gateway.wrap(b"item x", &id_x).unwrap();
        assert!(gateway.unwrap(&envelope, &id_y).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let content_id = ContentId::identify(b"data");

        let mut envelope = gateway.wrap(b"data", &content_id).unwrap();
        envelope.ciphertext[0] ^= 0xFF;
        assert!(gateway.unwrap(&envelope, &content_id).is_err());
    }

    #[test]
    fn test_nondeterministic_wrap() {
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let content_id = ContentId::identify(b"data");

        let a = gateway.wrap(b"data", &content_id).unwrap();
        let b = gateway.wrap(b"data", &content_id).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_payload_persistence_scoped() {
        let (gateway, _dir) = test_gateway([1u8; 32]);
        let content_id = ContentId::identify(b"data");

        gateway
            .persist_payload(PayloadScope::Network, &content_id, "{\"n\":1}")
            .unwrap();
        gateway
            .persist_payload(PayloadScope::User, &content_id, "{\"u\":2}")
            .unwrap();

        assert_eq!(
            gateway
                .load_payload(PayloadScope::Network, &content_id)
                .unwrap()
                .unwrap(),
            "{\"n\":1}"
        );
        assert_eq!(
            gateway
                .load_payload(PayloadScope::User, &content_id)
                .unwrap()
                .unwrap(),
            "{\"u\":2}"
        );

        gateway.remove_payloads(&content_id).unwrap();
        assert!(gateway
            .load_payload(PayloadScope::Network, &content_id)
            .unwrap()
            .is_none());
    }
}
