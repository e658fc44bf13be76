//! Provider transport boundary.
//!
//! The peer-to-peer message layer is an external collaborator; the
//! coordinator only sees [`ProviderClient`], a request/response seam over the
//! tagged protocol messages. The bundled implementation speaks HTTP to the
//! provider's `/rpc` endpoint; tests drive in-process providers through the
//! same trait.

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use common::messages::{ProviderRequest, ProviderResponse};
use common::ProviderId;

/// One provider endpoint as seen by the coordinator.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The provider's network identity.
    fn provider_id(&self) -> &ProviderId;

    /// Key used to verify this provider's response signatures.
    fn verifying_key(&self) -> VerifyingKey;

    /// Send one protocol request and await the tagged response.
    async fn request(&self, request: ProviderRequest) -> anyhow::Result<ProviderResponse>;
}

/// Source of the currently-known provider set.
///
/// Fed by the external registry collaborator; the coordinator reacts to
/// peer-set-changed events through [`StaticRegistry::update_peers`] rather
/// than polling anything itself.
pub trait ProviderRegistry: Send + Sync {
    /// All providers currently eligible for placement.
    fn providers(&self) -> Vec<Arc<dyn ProviderClient>>;

    /// Look up a provider by identity.
    fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderClient>>;
}

/// Registry over an explicitly-managed provider list.
pub struct StaticRegistry {
    providers: RwLock<Vec<Arc<dyn ProviderClient>>>,
}

impl StaticRegistry {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        Self {
            providers: RwLock::new(providers),
        }
    }

    /// Replace the provider set on a peer-set-changed event.
    pub fn update_peers(&self, providers: Vec<Arc<dyn ProviderClient>>) {
        let count = providers.len();
        *self.providers.write() = providers;
        info!(providers = count, "Provider set updated");
    }
}

impl ProviderRegistry for StaticRegistry {
    fn providers(&self) -> Vec<Arc<dyn ProviderClient>> {
        self.providers.read().clone()
    }

    fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderClient>> {
        self.providers
            .read()
            .iter()
            .find(|c| c.provider_id() == id)
            .cloned()
    }
}

/// HTTP client for a provider's `/rpc` endpoint.
pub struct HttpProviderClient {
    base_url: String,
    client: reqwest::Client,
    provider_id: ProviderId,
    verifying_key: VerifyingKey,
}

impl HttpProviderClient {
    /// Connect to a provider, learning its identity from `/status`.
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::new();

        let status: serde_json::Value = client
            .get(format!("{base_url}/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let provider_id = ProviderId::from_hex(
            status
                .get("provider_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("provider status missing provider_id"))?,
        );
        let verifying_key = provider_id
            .verifying_key()
            .ok_or_else(|| anyhow::anyhow!("provider id is not a valid Ed25519 key"))?;

        info!(provider_id = %provider_id, url = %base_url, "Connected to provider");
        Ok(Self {
            base_url,
            client,
            provider_id,
            verifying_key,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    async fn request(&self, request: ProviderRequest) -> anyhow::Result<ProviderResponse> {
        let response = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}
