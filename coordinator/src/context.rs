//! Process-wide identity and key material.
//!
//! Constructed once at startup and passed by reference into every component
//! that needs signing identity, curve parameters, or the custodial secret.
//! No component reaches into ambient global state.

use ed25519_dalek::{SigningKey, VerifyingKey};
use pos_commitments::CurveParameters;

/// Everything the coordinator's components need to act on the network.
pub struct NetworkContext {
    signing_key: SigningKey,
    curve: CurveParameters,
    custodial_secret: [u8; 32],
}

impl NetworkContext {
    /// Build the context from the node keypair and the custodial secret.
    ///
    /// Curve parameters are the fixed deployment group; all commitments
    /// issued and verified by this process share them.
    pub fn new(signing_key: SigningKey, custodial_secret: [u8; 32]) -> Self {
        Self {
            signing_key,
            curve: CurveParameters::p256(),
            custodial_secret,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn curve(&self) -> &CurveParameters {
        &self.curve
    }

    /// Root secret for deriving per-item custodial encryption keys.
    pub fn custodial_secret(&self) -> &[u8; 32] {
        &self.custodial_secret
    }
}
