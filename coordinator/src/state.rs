//! Persistent placement records (sled) and in-memory round guards.
//!
//! Placement-record mutation follows a single-writer-at-a-time discipline per
//! content id: callers take the id's async lock before writing. Challenge
//! rounds for a (content id, provider) pair are serialized through the
//! active-round guard so a new round can never start before the prior one
//! resolves.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use common::{ContentId, ProviderId};

use crate::error::{CoordinatorError, Result};

/// Per-provider commitment-chain state within a placement record.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProviderChain {
    /// Hex seed of the last verified round.
    pub last_seed: String,
    /// Hex commitment hash of the last verified round.
    pub last_commitment_hash: String,
    /// Rounds verified so far (the initial store counts as round 1).
    pub rounds: u64,
}

/// Where a content id lives and what to expect back from its holders.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PlacementRecord {
    /// User-facing content id (identifies the original payload).
    pub content_id: ContentId,
    /// Content id of the network ciphertext; the providers' storage key.
    pub ciphertext_id: ContentId,
    /// Chunk size the Merkle tree was built with.
    pub chunk_size: u32,
    /// Number of chunks in the ciphertext.
    pub chunk_count: u32,
    /// Expected Merkle root (hex), owned by the coordinator.
    pub merkle_root: String,
    /// Providers holding a copy, with their chain state.
    pub providers: BTreeMap<ProviderId, ProviderChain>,
    /// Unix timestamp the record was created.
    pub created_at: u64,
}

impl PlacementRecord {
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }
}

/// Sled tree names
const PLACEMENTS_TREE: &str = "placements";
const PAYLOADS_TREE: &str = "payloads";

/// Coordinator state: sled-backed records plus transient concurrency guards.
pub struct CoordinatorState {
    db: sled::Db,
    placements_tree: sled::Tree,
    payloads_tree: sled::Tree,

    /// Per-content-id writer locks (single writer at a time per id).
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,

    /// Active challenge rounds keyed by "content_id:provider_id".
    active_rounds: DashMap<String, ()>,
}

impl CoordinatorState {
    /// Open the sled database, creating parent directories as needed.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(db_path)?;
        let placements_tree = db.open_tree(PLACEMENTS_TREE)?;
        let payloads_tree = db.open_tree(PAYLOADS_TREE)?;

        info!(
            records = placements_tree.len(),
            "Coordinator state opened"
        );
        Ok(Self {
            db,
            placements_tree,
            payloads_tree,
            locks: DashMap::new(),
            active_rounds: DashMap::new(),
        })
    }

    /// Tree handed to the encryption gateway for payload descriptors.
    pub fn payloads_tree(&self) -> sled::Tree {
        self.payloads_tree.clone()
    }

    /// The exclusive writer lock for a content id.
    pub fn lock_for(&self, content_id: &ContentId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(content_id.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Insert or replace a placement record. Caller holds the id's lock.
    pub fn upsert_record(&self, record: &PlacementRecord) -> Result<()> {
        let bytes = bincode::serialize(record)
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        self.placements_tree
            .insert(record.content_id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    /// Fetch the placement record for a content id.
    pub fn get_record(&self, content_id: &ContentId) -> Result<Option<PlacementRecord>> {
        Ok(self
            .placements_tree
            .get(content_id.as_str().as_bytes())?
            .and_then(|ivec| match bincode::deserialize(&ivec) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(content_id = %content_id, error = %e, "Skipping corrupted placement record");
                    None
                }
            }))
    }

    /// Remove a placement record on deletion.
    pub fn remove_record(&self, content_id: &ContentId) -> Result<()> {
        self.placements_tree
            .remove(content_id.as_str().as_bytes())?;
        Ok(())
    }

    /// All placement records, skipping corrupted entries.
    pub fn all_records(&self) -> Vec<PlacementRecord> {
        let mut records = Vec::new();
        for result in self.placements_tree.iter() {
            match result {
                Ok((key, value)) => match bincode::deserialize(&value) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        let key_str = String::from_utf8_lossy(&key);
                        warn!(key = %key_str, error = %e, "Skipping corrupted placement record");
                    }
                },
                Err(e) => warn!(error = %e, "Error reading placement records"),
            }
        }
        records
    }

    /// Number of records currently tracked.
    pub fn record_count(&self) -> usize {
        self.placements_tree.len()
    }

    /// Advance one provider's chain after a verified round.
    /// Caller holds the id's lock.
    pub fn update_provider_chain(
        &self,
        content_id: &ContentId,
        provider: &ProviderId,
        seed_hex: &str,
        commitment_hash_hex: &str,
    ) -> Result<()> {
        let mut record = self
            .get_record(content_id)?
            .ok_or_else(|| CoordinatorError::UnknownContent(content_id.clone()))?;
        let chain = record.providers.get_mut(provider).ok_or_else(|| {
            CoordinatorError::UnknownContent(content_id.clone())
        })?;
        chain.last_seed = seed_hex.to_string();
        chain.last_commitment_hash = commitment_hash_hex.to_string();
        chain.rounds += 1;
        self.upsert_record(&record)
    }

    /// Claim the round slot for a (content id, provider) pair.
    ///
    /// Returns false if a round is already in flight; rounds per pair are
    /// strictly sequential.
    pub fn try_begin_round(&self, content_id: &ContentId, provider: &ProviderId) -> bool {
        let key = round_key(content_id, provider);
        match self.active_rounds.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                true
            }
        }
    }

    /// Release the round slot once the round resolved.
    pub fn end_round(&self, content_id: &ContentId, provider: &ProviderId) {
        self.active_rounds.remove(&round_key(content_id, provider));
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for CoordinatorState {
    fn drop(&mut self) {
        // Best-effort flush on drop
        let _ = self.flush();
    }
}

fn round_key(content_id: &ContentId, provider: &ProviderId) -> String {
    format!("{}:{}", content_id, provider)
}
