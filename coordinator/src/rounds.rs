//! Challenge protocol state machine.
//!
//! Each (content id, provider) pair cycles through
//! `Idle → Committed → Challenged → Verified | Failed`. The initial
//! commitment recorded at store time puts the pair in `Committed`; a round
//! issues a fresh seed and chunk index (`Challenged`), and resolves either to
//! `Verified`, returning to `Idle` with updated chain state, or to `Failed`
//! on timeout, commitment mismatch, or proof mismatch. A provider that never
//! responds is failed at timeout expiry, never left dangling in `Challenged`.
//!
//! Rounds for a pair are strictly sequential; pairs across different content
//! ids or providers run independently. This module only reacts to explicit
//! round events (`run_round`, `run_tick`); the wall-clock driving those
//! events lives with the process bootstrapper.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use common::messages::{ChallengeRequest, ChallengeResponse, ProviderRequest, ProviderResponse};
use common::{ContentId, ProviderId};
use pos_commitments::{
    challenge_index, decode_point, decode_scalar, fresh_seed, hash_leaf, verify_chain,
    verify_opening, verify_proof, CurveParameters, MerkleProof,
};

use crate::context::NetworkContext;
use crate::error::{CoordinatorError, Result};
use crate::metrics::Metrics;
use crate::state::{CoordinatorState, PlacementRecord};
use crate::transport::ProviderRegistry;

/// Why a round resolved to `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundFailure {
    /// No response within the configured bound.
    Timeout,
    /// Response signature did not verify for this round's request.
    BadSignature,
    /// Commitment point, scalar, or chain hash failed verification.
    CommitmentMismatch(String),
    /// Merkle proof failed to reconcile with the expected root.
    ProofMismatch,
    /// Transport-level failure before any verification.
    Transport(String),
}

impl RoundFailure {
    /// Stable label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RoundFailure::Timeout => "timeout",
            RoundFailure::BadSignature => "bad_signature",
            RoundFailure::CommitmentMismatch(_) => "commitment_mismatch",
            RoundFailure::ProofMismatch => "proof_mismatch",
            RoundFailure::Transport(_) => "transport",
        }
    }
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundFailure::Timeout => write!(f, "timeout"),
            RoundFailure::BadSignature => write!(f, "bad signature"),
            RoundFailure::CommitmentMismatch(reason) => write!(f, "commitment mismatch: {reason}"),
            RoundFailure::ProofMismatch => write!(f, "merkle proof mismatch"),
            RoundFailure::Transport(reason) => write!(f, "transport: {reason}"),
        }
    }
}

/// Final state of one challenge round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundResult {
    Verified,
    Failed(RoundFailure),
}

/// Outcome of one commit-verify cycle, with enough detail for reliability
/// accounting upstream.
#[derive(Clone, Debug)]
pub struct ChallengeOutcome {
    pub content_id: ContentId,
    pub provider: ProviderId,
    /// Hex seed this round was issued under.
    pub seed: String,
    /// Chunk index that was challenged.
    pub index: u32,
    pub result: RoundResult,
}

/// Releases the pair's round slot when the round resolves, on every path.
struct RoundGuard<'a> {
    state: &'a CoordinatorState,
    content_id: &'a ContentId,
    provider: &'a ProviderId,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.state.end_round(self.content_id, self.provider);
    }
}

/// Drives challenge rounds against the provider set.
pub struct ChallengeRunner {
    state: Arc<CoordinatorState>,
    registry: Arc<dyn ProviderRegistry>,
    context: Arc<NetworkContext>,
    challenge_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ChallengeRunner {
    pub fn new(
        state: Arc<CoordinatorState>,
        registry: Arc<dyn ProviderRegistry>,
        context: Arc<NetworkContext>,
        challenge_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            registry,
            context,
            challenge_timeout,
            metrics,
        }
    }

    /// Run one challenge round for a (content id, provider) pair.
    ///
    /// Returns an error only for protocol misuse (unknown content, a round
    /// already in flight); a provider failing the challenge is a normal
    /// `Failed` outcome, reported with the round's seed attached.
    pub async fn run_round(
        &self,
        content_id: &ContentId,
        provider: &ProviderId,
    ) -> Result<ChallengeOutcome> {
        let record = self
            .state
            .get_record(content_id)?
            .ok_or_else(|| CoordinatorError::UnknownContent(content_id.clone()))?;
        if !record.providers.contains_key(provider) {
            return Err(CoordinatorError::UnknownContent(content_id.clone()));
        }

        if !self.state.try_begin_round(content_id, provider) {
            return Err(CoordinatorError::RoundInFlight {
                content_id: content_id.clone(),
                provider: provider.clone(),
            });
        }
        let _slot = RoundGuard {
            state: &self.state,
            content_id,
            provider,
        };

        // Committed → Challenged: issue a fresh seed and derived index.
        let seed = fresh_seed();
        let seed_hex = hex::encode(seed);
        let index = challenge_index(&seed, record.chunk_count)?;
        let curve = self.context.curve();
        let request = ChallengeRequest {
            challenge_hash: record.ciphertext_id.as_str().to_string(),
            challenge_index: index,
            chunk_size: record.chunk_size,
            curve: curve.name().to_string(),
            g: curve.g_hex(),
            h: curve.h_hex(),
            seed: seed_hex.clone(),
        };
        debug!(
            content_id = %content_id,
            provider = %provider,
            index,
            seed = %seed_hex,
            "Challenge issued"
        );

        let outcome = |result: RoundResult| ChallengeOutcome {
            content_id: content_id.clone(),
            provider: provider.clone(),
            seed: seed_hex.clone(),
            index,
            result,
        };

        let Some(client) = self.registry.get(provider) else {
            let failure = RoundFailure::Transport("provider not in registry".to_string());
            self.record_failure(content_id, provider, &seed_hex, &failure);
            return Ok(outcome(RoundResult::Failed(failure)));
        };

        // Challenged → Verified | Failed, with the timeout as a hard bound.
        let response = match timeout(
            self.challenge_timeout,
            client.request(ProviderRequest::Challenge(request.clone())),
        )
        .await
        {
            Err(_) => {
                let failure = RoundFailure::Timeout;
                self.record_failure(content_id, provider, &seed_hex, &failure);
                return Ok(outcome(RoundResult::Failed(failure)));
            }
            Ok(Err(e)) => {
                let failure = RoundFailure::Transport(e.to_string());
                self.record_failure(content_id, provider, &seed_hex, &failure);
                return Ok(outcome(RoundResult::Failed(failure)));
            }
            Ok(Ok(ProviderResponse::Challenge(response))) => response,
            Ok(Ok(ProviderResponse::Error { message })) => {
                let failure = RoundFailure::Transport(message);
                self.record_failure(content_id, provider, &seed_hex, &failure);
                return Ok(outcome(RoundResult::Failed(failure)));
            }
            Ok(Ok(_)) => {
                let failure = RoundFailure::Transport("unexpected response type".to_string());
                self.record_failure(content_id, provider, &seed_hex, &failure);
                return Ok(outcome(RoundResult::Failed(failure)));
            }
        };

        match verify_challenge_response(
            &record,
            &seed,
            &request,
            &response,
            &client.verifying_key(),
            curve,
        ) {
            Ok(()) => {
                // Verified: back to Idle with the chain advanced.
                let lock = self.state.lock_for(content_id);
                let _guard = lock.lock().await;
                self.state.update_provider_chain(
                    content_id,
                    provider,
                    &seed_hex,
                    &response.commitment_hash,
                )?;
                Metrics::count(&self.metrics.challenge_rounds, "verified");
                info!(
                    content_id = %content_id,
                    provider = %provider,
                    index,
                    "Challenge round verified"
                );
                Ok(outcome(RoundResult::Verified))
            }
            Err(failure) => {
                self.record_failure(content_id, provider, &seed_hex, &failure);
                Ok(outcome(RoundResult::Failed(failure)))
            }
        }
    }

    /// Run one round for every (record, provider) pair, up to `max_rounds`.
    ///
    /// Invoked on each external scheduler tick. Pairs run as independent
    /// concurrent tasks; pairs with a round already in flight are skipped.
    pub async fn run_tick(self: &Arc<Self>, max_rounds: usize) -> Vec<ChallengeOutcome> {
        let mut pairs = Vec::new();
        for record in self.state.all_records() {
            for provider in record.provider_ids() {
                pairs.push((record.content_id.clone(), provider));
            }
        }
        pairs.truncate(max_rounds);

        let mut tasks = Vec::with_capacity(pairs.len());
        for (content_id, provider) in pairs {
            let runner = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                runner.run_round(&content_id, &provider).await
            }));
        }

        let mut outcomes = Vec::new();
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(CoordinatorError::RoundInFlight { content_id, provider })) => {
                    debug!(content_id = %content_id, provider = %provider, "Round still in flight, skipped");
                }
                Ok(Err(e)) => warn!(error = %e, "Challenge round errored"),
                Err(e) => warn!(error = %e, "Challenge task panicked"),
            }
        }
        outcomes
    }

    fn record_failure(
        &self,
        content_id: &ContentId,
        provider: &ProviderId,
        seed_hex: &str,
        failure: &RoundFailure,
    ) {
        Metrics::count(&self.metrics.challenge_rounds, failure.as_label());
        warn!(
            content_id = %content_id,
            provider = %provider,
            seed = %seed_hex,
            failure = %failure,
            "Challenge round failed"
        );
    }
}

/// Full verification of a challenge response:
/// 1. response signature over the round's request
/// 2. returned root equals the record's expected root
/// 3. Merkle proof reconciles the revealed chunk with that root
/// 4. Pedersen commitment opens against the revealed chunk
/// 5. commitment hash links the chain proof to this round's seed
///
/// The chain proof itself (`H(data || prev_seed)`) is not independently
/// recomputable here without the full ciphertext; possession is established
/// by the Merkle proof and chunk commitment, and the linkage check keeps the
/// chain extendable only by a provider that can produce it from the bytes.
fn verify_challenge_response(
    record: &PlacementRecord,
    seed: &[u8],
    request: &ChallengeRequest,
    response: &ChallengeResponse,
    verifying_key: &ed25519_dalek::VerifyingKey,
    curve: &CurveParameters,
) -> std::result::Result<(), RoundFailure> {
    if !response.verify_signature(request, verifying_key) {
        return Err(RoundFailure::BadSignature);
    }

    if response.merkle_root != record.merkle_root {
        return Err(RoundFailure::ProofMismatch);
    }
    let root: [u8; 32] = hex::decode(&record.merkle_root)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(RoundFailure::ProofMismatch)?;
    let proof = MerkleProof::from_wire(request.challenge_index, &response.merkle_proof)
        .map_err(|_| RoundFailure::ProofMismatch)?;
    if !verify_proof(
        &root,
        &hash_leaf(&response.data_chunk),
        request.challenge_index,
        &proof,
        record.chunk_count,
    ) {
        return Err(RoundFailure::ProofMismatch);
    }

    let point = decode_point(&response.commitment)
        .map_err(|e| RoundFailure::CommitmentMismatch(e.to_string()))?;
    let randomness = decode_scalar(&response.randomness)
        .map_err(|e| RoundFailure::CommitmentMismatch(e.to_string()))?;
    if !verify_opening(&response.data_chunk, &randomness, &point, curve) {
        return Err(RoundFailure::CommitmentMismatch(
            "commitment does not open against the revealed chunk".to_string(),
        ));
    }

    let chain_proof: [u8; 32] = hex::decode(&response.commitment_proof)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| {
            RoundFailure::CommitmentMismatch("chain proof is not 32 hex-encoded bytes".to_string())
        })?;
    let commitment_hash: [u8; 32] = hex::decode(&response.commitment_hash)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| {
            RoundFailure::CommitmentMismatch("chain hash is not 32 hex-encoded bytes".to_string())
        })?;
    if !verify_chain(&chain_proof, seed, &commitment_hash) {
        return Err(RoundFailure::CommitmentMismatch(
            "commitment hash does not link to this round's seed".to_string(),
        ));
    }

    Ok(())
}
