//! Persistent ciphertext storage for a provider (sled).
//!
//! Two trees: `blobs` maps content id to ciphertext bytes, `chain` maps
//! content id to the last challenge seed seen for that item. The chain entry
//! is what lets the provider extend the commitment-hash chain on the next
//! round.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use common::ContentId;

/// Per-item chain state persisted alongside the blob (bincode serialized).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChainEntry {
    /// Seed of the most recent commitment round for this item.
    pub last_seed: Vec<u8>,
    /// Number of rounds answered so far.
    pub rounds: u64,
}

/// Sled tree names
const BLOBS_TREE: &str = "blobs";
const CHAIN_TREE: &str = "chain";

/// Provider-local blob and chain-state storage.
pub struct ProviderStore {
    db: sled::Db,
    blobs_tree: sled::Tree,
    chain_tree: sled::Tree,
}

impl ProviderStore {
    /// Open the sled database, creating parent directories as needed.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(db_path)?;
        let blobs_tree = db.open_tree(BLOBS_TREE)?;
        let chain_tree = db.open_tree(CHAIN_TREE)?;
        Ok(Self {
            db,
            blobs_tree,
            chain_tree,
        })
    }

    /// Store a ciphertext under its content id.
    pub fn put_blob(&self, id: &ContentId, bytes: &[u8]) -> sled::Result<()> {
        self.blobs_tree.insert(id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    /// Fetch a ciphertext by content id.
    pub fn get_blob(&self, id: &ContentId) -> sled::Result<Option<Vec<u8>>> {
        Ok(self
            .blobs_tree
            .get(id.as_str().as_bytes())?
            .map(|ivec| ivec.to_vec()))
    }

    /// Remove a ciphertext and its chain state. Returns true if a blob was
    /// actually held.
    pub fn delete(&self, id: &ContentId) -> sled::Result<bool> {
        let existed = self.blobs_tree.remove(id.as_str().as_bytes())?.is_some();
        self.chain_tree.remove(id.as_str().as_bytes())?;
        Ok(existed)
    }

    /// Chain state for an item, if any round has been answered.
    pub fn chain(&self, id: &ContentId) -> sled::Result<Option<ChainEntry>> {
        Ok(self
            .chain_tree
            .get(id.as_str().as_bytes())?
            .and_then(|ivec| bincode::deserialize(&ivec).ok()))
    }

    /// Record the seed of the round just answered.
    pub fn advance_chain(&self, id: &ContentId, seed: &[u8]) -> sled::Result<()> {
        let rounds = self.chain(id)?.map(|e| e.rounds).unwrap_or(0) + 1;
        let entry = ChainEntry {
            last_seed: seed.to_vec(),
            rounds,
        };
        let bytes = match bincode::serialize(&entry) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, content_id = %id, "Failed to serialize chain entry");
                return Ok(());
            }
        };
        self.chain_tree.insert(id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    /// Number of blobs currently held.
    pub fn blob_count(&self) -> usize {
        self.blobs_tree.len()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> sled::Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for ProviderStore {
    fn drop(&mut self) {
        // Best-effort flush on drop
        let _ = self.flush();
    }
}
