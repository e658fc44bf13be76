//! Redundant placement: parallel store fan-out and verified retrieval.
//!
//! A store fans out to `redundancy_factor` distinct providers as independent
//! tasks, each with its own timeout. The store succeeds once the configured
//! quorum of providers acknowledges with a verifying commitment; sub-failures
//! are tolerated and recorded. Retrieval walks the placement record's
//! providers and returns the first copy whose content hash and commitment
//! chain both check out.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use common::messages::{
    DeleteRequest, ProviderRequest, ProviderResponse, RetrieveRequest, StoreRequest,
};
use common::{now_secs, ContentId, ProviderId};
use pos_commitments::{
    chain_hash, chain_proof, decode_point, decode_scalar, fresh_seed, split_chunks,
    verify_opening, CurveParameters, MerkleTree,
};

use crate::context::NetworkContext;
use crate::error::{CoordinatorError, Result};
use crate::metrics::Metrics;
use crate::state::{CoordinatorState, PlacementRecord, ProviderChain};
use crate::transport::{ProviderClient, ProviderRegistry};

/// How many of the fanned-out store attempts must succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Every targeted provider must acknowledge.
    All,
    /// More than half of the targeted providers must acknowledge.
    Majority,
    /// A single acknowledgment suffices.
    AtLeastOne,
}

impl QuorumPolicy {
    /// Acknowledgments required for a fan-out of `redundancy` providers.
    pub fn required(&self, redundancy: usize) -> usize {
        match self {
            QuorumPolicy::All => redundancy,
            QuorumPolicy::Majority => redundancy / 2 + 1,
            QuorumPolicy::AtLeastOne => 1,
        }
    }
}

impl FromStr for QuorumPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(QuorumPolicy::All),
            "majority" => Ok(QuorumPolicy::Majority),
            "at_least_one" => Ok(QuorumPolicy::AtLeastOne),
            other => Err(format!("unknown quorum policy: {other}")),
        }
    }
}

/// Placement behavior knobs.
#[derive(Clone, Debug)]
pub struct PlacementConfig {
    /// Number of distinct providers to target per store.
    pub redundancy_factor: usize,
    /// Quorum required for a store to succeed.
    pub quorum: QuorumPolicy,
    /// Chunk size for the ciphertext Merkle tree.
    pub chunk_size: u32,
    /// Independent timeout applied to every provider round trip.
    pub provider_timeout: Duration,
}

/// Drives parallel store, retrieve, and delete operations.
pub struct PlacementCoordinator {
    state: Arc<CoordinatorState>,
    registry: Arc<dyn ProviderRegistry>,
    context: Arc<NetworkContext>,
    config: PlacementConfig,
    metrics: Arc<Metrics>,
}

impl PlacementCoordinator {
    pub fn new(
        state: Arc<CoordinatorState>,
        registry: Arc<dyn ProviderRegistry>,
        context: Arc<NetworkContext>,
        config: PlacementConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            registry,
            context,
            config,
            metrics,
        }
    }

    /// Distribute a ciphertext to the provider set with redundancy.
    ///
    /// `content_id` is the user-facing id the record is filed under; the
    /// providers key the data by the ciphertext's own content id. Succeeds
    /// once the quorum acknowledges; otherwise fails with the provider-level
    /// sub-failures attached.
    pub async fn store(&self, content_id: ContentId, ciphertext: Vec<u8>) -> Result<PlacementRecord> {
        if ciphertext.is_empty() {
            return Err(CoordinatorError::EmptyPayload);
        }

        let ciphertext_id = ContentId::identify(&ciphertext);
        let chunks = split_chunks(&ciphertext, self.config.chunk_size as usize)?;
        let tree = MerkleTree::from_chunks(&chunks)?;
        let seed = fresh_seed();

        let curve = self.context.curve();
        let request = StoreRequest {
            encrypted_data: ciphertext.clone(),
            curve: curve.name().to_string(),
            g: curve.g_hex(),
            h: curve.h_hex(),
            seed: hex::encode(seed),
        };

        let clients: Vec<Arc<dyn ProviderClient>> = self
            .registry
            .providers()
            .into_iter()
            .take(self.config.redundancy_factor)
            .collect();
        let required = self.config.quorum.required(self.config.redundancy_factor);

        let mut tasks = Vec::with_capacity(clients.len());
        for client in clients {
            let request = request.clone();
            let ciphertext = ciphertext.clone();
            let curve = curve.clone();
            let provider_timeout = self.config.provider_timeout;
            tasks.push(tokio::spawn(async move {
                let provider = client.provider_id().clone();
                let outcome = match timeout(
                    provider_timeout,
                    client.request(ProviderRequest::Store(request.clone())),
                )
                .await
                {
                    Err(_) => Err(format!(
                        "timed out after {}s",
                        provider_timeout.as_secs()
                    )),
                    Ok(Err(e)) => Err(format!("transport: {e}")),
                    Ok(Ok(ProviderResponse::Store(response))) => verify_store_response(
                        &ciphertext,
                        &seed,
                        &request,
                        &response,
                        &client.verifying_key(),
                        &curve,
                    )
                    .map(|()| response.commitment_hash),
                    Ok(Ok(ProviderResponse::Error { message })) => Err(message),
                    Ok(Ok(_)) => Err("unexpected response type".to_string()),
                };
                (provider, outcome)
            }));
        }

        let mut acknowledged: BTreeMap<ProviderId, ProviderChain> = BTreeMap::new();
        let mut failures: Vec<(ProviderId, String)> = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((provider, Ok(commitment_hash))) => {
                    acknowledged.insert(
                        provider,
                        ProviderChain {
                            last_seed: hex::encode(seed),
                            last_commitment_hash: commitment_hash,
                            rounds: 1,
                        },
                    );
                }
                Ok((provider, Err(reason))) => {
                    warn!(provider = %provider, content_id = %content_id, reason = %reason, "Store attempt failed");
                    failures.push((provider, reason));
                }
                Err(e) => warn!(error = %e, "Store task panicked"),
            }
        }

        if acknowledged.len() < required {
            Metrics::count(&self.metrics.store_ops, "quorum_failed");
            return Err(CoordinatorError::QuorumNotMet {
                content_id,
                required,
                acked: acknowledged.len(),
                failures,
            });
        }

        let record = PlacementRecord {
            content_id: content_id.clone(),
            ciphertext_id,
            chunk_size: self.config.chunk_size,
            chunk_count: chunks.len() as u32,
            merkle_root: tree.root_hex(),
            providers: acknowledged,
            created_at: now_secs(),
        };

        let lock = self.state.lock_for(&content_id);
        let _guard = lock.lock().await;
        self.state.upsert_record(&record)?;
        self.metrics.placement_records.set(self.state.record_count() as i64);
        Metrics::count(&self.metrics.store_ops, "stored");

        info!(
            content_id = %content_id,
            providers = record.providers.len(),
            chunks = record.chunk_count,
            failed = failures.len(),
            "Stored with quorum"
        );
        Ok(record)
    }

    /// Fetch the ciphertext for a content id back from its providers.
    ///
    /// Providers are tried in record order; the first copy whose recomputed
    /// hash and commitment chain match the record wins. Exhausting all
    /// providers without a valid copy fails with `DataUnavailable`.
    pub async fn retrieve(&self, content_id: &ContentId) -> Result<Vec<u8>> {
        let lock = self.state.lock_for(content_id);
        let _guard = lock.lock().await;

        let record = self
            .state
            .get_record(content_id)?
            .ok_or_else(|| CoordinatorError::UnknownContent(content_id.clone()))?;

        for (provider_id, chain) in &record.providers {
            let Some(client) = self.registry.get(provider_id) else {
                debug!(provider = %provider_id, "Provider not in registry, skipping");
                continue;
            };

            let seed = fresh_seed();
            let request = RetrieveRequest {
                data_hash: record.ciphertext_id.as_str().to_string(),
                seed: hex::encode(seed),
            };

            let response = match timeout(
                self.config.provider_timeout,
                client.request(ProviderRequest::Retrieve(request.clone())),
            )
            .await
            {
                Err(_) => {
                    warn!(provider = %provider_id, content_id = %content_id, "Retrieve timed out");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(provider = %provider_id, error = %e, "Retrieve transport error");
                    continue;
                }
                Ok(Ok(ProviderResponse::Retrieve(response))) => response,
                Ok(Ok(ProviderResponse::Error { message })) => {
                    warn!(provider = %provider_id, message = %message, "Provider rejected retrieve");
                    continue;
                }
                Ok(Ok(_)) => {
                    warn!(provider = %provider_id, "Unexpected response type");
                    continue;
                }
            };

            match verify_retrieve_response(
                &record.ciphertext_id,
                chain,
                &seed,
                &request,
                &response,
                &client.verifying_key(),
            ) {
                Ok(()) => {
                    self.state.update_provider_chain(
                        content_id,
                        provider_id,
                        &hex::encode(seed),
                        &response.commitment_hash,
                    )?;
                    Metrics::count(&self.metrics.retrieve_ops, "ok");
                    debug!(provider = %provider_id, content_id = %content_id, "Retrieved verified copy");
                    return Ok(response.data);
                }
                Err(reason) => {
                    warn!(
                        provider = %provider_id,
                        content_id = %content_id,
                        seed = %hex::encode(seed),
                        reason = %reason,
                        "Retrieved copy failed verification"
                    );
                }
            }
        }

        Metrics::count(&self.metrics.retrieve_ops, "unavailable");
        Err(CoordinatorError::DataUnavailable(content_id.clone()))
    }

    /// Drop an item from all its providers and remove the record.
    pub async fn delete(&self, content_id: &ContentId) -> Result<()> {
        let record = self
            .state
            .get_record(content_id)?
            .ok_or_else(|| CoordinatorError::UnknownContent(content_id.clone()))?;

        let mut tasks = Vec::new();
        for provider_id in record.provider_ids() {
            let Some(client) = self.registry.get(&provider_id) else {
                continue;
            };
            let request = DeleteRequest {
                data_hash: record.ciphertext_id.as_str().to_string(),
            };
            let provider_timeout = self.config.provider_timeout;
            tasks.push(tokio::spawn(async move {
                let result = timeout(
                    provider_timeout,
                    client.request(ProviderRequest::Delete(request)),
                )
                .await;
                (provider_id, result)
            }));
        }
        for joined in join_all(tasks).await {
            if let Ok((provider, result)) = joined {
                match result {
                    Ok(Ok(ProviderResponse::Delete(resp))) => {
                        debug!(provider = %provider, deleted = resp.deleted, "Delete acknowledged");
                    }
                    other => {
                        warn!(provider = %provider, outcome = ?other.is_ok(), "Delete not acknowledged");
                    }
                }
            }
        }

        let lock = self.state.lock_for(content_id);
        let _guard = lock.lock().await;
        self.state.remove_record(content_id)?;
        self.metrics.placement_records.set(self.state.record_count() as i64);
        info!(content_id = %content_id, "Placement record removed");
        Ok(())
    }
}

/// Check a store acknowledgment: signature, commitment opening against the
/// ciphertext we sent, and the initial chain hash.
fn verify_store_response(
    ciphertext: &[u8],
    seed: &[u8],
    request: &StoreRequest,
    response: &common::messages::StoreResponse,
    verifying_key: &ed25519_dalek::VerifyingKey,
    curve: &CurveParameters,
) -> std::result::Result<(), String> {
    if !response.verify_signature(request, verifying_key) {
        return Err("bad signature".to_string());
    }
    let point = decode_point(&response.commitment).map_err(|e| e.to_string())?;
    let randomness = decode_scalar(&response.randomness).map_err(|e| e.to_string())?;
    if !verify_opening(ciphertext, &randomness, &point, curve) {
        return Err("commitment does not open against the stored bytes".to_string());
    }
    // Initial round chains off the empty previous seed.
    let proof = chain_proof(ciphertext, b"");
    if hex::encode(chain_hash(&proof, seed)) != response.commitment_hash {
        return Err("commitment hash does not match the seed chain".to_string());
    }
    Ok(())
}

/// Check a retrieved copy: content hash, signature, and chain linkage off the
/// seed of the provider's last verified round.
fn verify_retrieve_response(
    ciphertext_id: &ContentId,
    chain: &ProviderChain,
    seed: &[u8],
    request: &RetrieveRequest,
    response: &common::messages::RetrieveResponse,
    verifying_key: &ed25519_dalek::VerifyingKey,
) -> std::result::Result<(), String> {
    if !response.verify_signature(request, verifying_key) {
        return Err("bad signature".to_string());
    }
    if &ContentId::identify(&response.data) != ciphertext_id {
        return Err("returned data does not hash to the requested id".to_string());
    }
    let prev_seed = hex::decode(&chain.last_seed)
        .map_err(|_| "recorded chain seed is not valid hex".to_string())?;
    let proof = chain_proof(&response.data, &prev_seed);
    if hex::encode(proof) != response.commitment_proof {
        return Err("chain proof does not derive from the previous seed".to_string());
    }
    if hex::encode(chain_hash(&proof, seed)) != response.commitment_hash {
        return Err("commitment hash does not match the fresh seed".to_string());
    }
    Ok(())
}
