//! Protocol handlers for a storage provider.
//!
//! Every response is signed over the fixed required-field list of its message
//! type, so the coordinator can attribute answers to this provider's
//! identity. Chain state advances only after a round's response has been
//! fully computed.

use ed25519_dalek::{SigningKey, VerifyingKey};
use thiserror::Error;
use tracing::{debug, warn};

use common::messages::{
    ChallengeRequest, ChallengeResponse, DeleteRequest, DeleteResponse, ProviderRequest,
    ProviderResponse, RetrieveRequest, RetrieveResponse, StoreRequest, StoreResponse,
};
use common::{ContentId, ProviderId};
use pos_commitments::{
    chain_hash, chain_proof, commit, commit_value, encode_point, encode_scalar, split_chunks,
    CurveParameters, MerkleTree, PosError,
};

use crate::store::ProviderStore;

/// Errors a provider can return for a protocol request.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No blob stored under the requested content id
    #[error("unknown content id: {0}")]
    NotFound(String),

    /// Request fields failed to decode or validate
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Commitment or Merkle layer rejected the inputs
    #[error(transparent)]
    Pos(#[from] PosError),

    /// Underlying sled failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for ProviderError {
    fn from(err: sled::Error) -> Self {
        ProviderError::Storage(err.to_string())
    }
}

/// A storage provider node: blob store plus signing identity.
pub struct ProviderNode {
    store: ProviderStore,
    signing_key: SigningKey,
    provider_id: ProviderId,
}

impl ProviderNode {
    pub fn new(store: ProviderStore, signing_key: SigningKey) -> Self {
        let provider_id = ProviderId::from_verifying_key(&signing_key.verifying_key());
        Self {
            store,
            signing_key,
            provider_id,
        }
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn store(&self) -> &ProviderStore {
        &self.store
    }

    /// Dispatch a protocol request; failures become tagged error responses.
    pub fn handle(&self, request: ProviderRequest) -> ProviderResponse {
        let result = match request {
            ProviderRequest::Store(req) => self.handle_store(&req).map(ProviderResponse::Store),
            ProviderRequest::Challenge(req) => {
                self.handle_challenge(&req).map(ProviderResponse::Challenge)
            }
            ProviderRequest::Retrieve(req) => {
                self.handle_retrieve(&req).map(ProviderResponse::Retrieve)
            }
            ProviderRequest::Delete(req) => self.handle_delete(&req).map(ProviderResponse::Delete),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Request failed");
            ProviderResponse::Error {
                message: e.to_string(),
            }
        })
    }

    /// Store a ciphertext and answer with the initial commitment round.
    pub fn handle_store(&self, request: &StoreRequest) -> Result<StoreResponse, ProviderError> {
        if request.encrypted_data.is_empty() {
            return Err(ProviderError::BadRequest("empty payload".to_string()));
        }
        let params = CurveParameters::from_hex(&request.curve, &request.g, &request.h)?;
        let seed = decode_seed(&request.seed)?;

        let content_id = request.content_id();
        self.store.put_blob(&content_id, &request.encrypted_data)?;

        // Initial round: no previous seed in the chain yet.
        let commitment = commit(&request.encrypted_data, &seed, b"", &params);
        self.store.advance_chain(&content_id, &seed)?;

        debug!(
            content_id = %content_id,
            bytes = request.encrypted_data.len(),
            "Stored blob and committed"
        );

        let mut response = StoreResponse {
            randomness: commitment.randomness_hex(),
            commitment: commitment.point_hex(),
            commitment_hash: commitment.hash_hex(),
            signature: Vec::new(),
        };
        response.sign(request, &self.signing_key);
        Ok(response)
    }

    /// Answer a challenge round: reveal the chunk, its Merkle proof, a chunk
    /// commitment, and the next chain link.
    pub fn handle_challenge(
        &self,
        request: &ChallengeRequest,
    ) -> Result<ChallengeResponse, ProviderError> {
        let params = CurveParameters::from_hex(&request.curve, &request.g, &request.h)?;
        let seed = decode_seed(&request.seed)?;
        let content_id = parse_content_id(&request.challenge_hash)?;

        let data = self
            .store
            .get_blob(&content_id)?
            .ok_or_else(|| ProviderError::NotFound(request.challenge_hash.clone()))?;
        let prev_seed = self
            .store
            .chain(&content_id)?
            .ok_or_else(|| ProviderError::NotFound(request.challenge_hash.clone()))?
            .last_seed;

        let chunks = split_chunks(&data, request.chunk_size as usize)?;
        let index = request.challenge_index;
        let chunk = chunks
            .get(index as usize)
            .ok_or(PosError::ChunkIndexOutOfBounds {
                index,
                max: chunks.len().saturating_sub(1) as u32,
            })?;

        let tree = MerkleTree::from_chunks(&chunks)?;
        let merkle_proof = tree.prove(index)?;

        // The Pedersen point covers the revealed chunk; the hash chain runs
        // over the whole ciphertext.
        let (randomness, point) = commit_value(chunk, &params);
        let proof = chain_proof(&data, &prev_seed);
        let hash = chain_hash(&proof, &seed);
        self.store.advance_chain(&content_id, &seed)?;

        debug!(
            content_id = %content_id,
            index,
            chunks = chunks.len(),
            "Answered challenge"
        );

        let mut response = ChallengeResponse {
            commitment_hash: hex::encode(hash),
            commitment_proof: hex::encode(proof),
            commitment: encode_point(&point),
            data_chunk: chunk.clone(),
            randomness: encode_scalar(&randomness),
            merkle_proof: merkle_proof.to_wire(),
            merkle_root: tree.root_hex(),
            signature: Vec::new(),
        };
        response.sign(request, &self.signing_key);
        Ok(response)
    }

    /// Return the stored ciphertext along with fresh chain hashes.
    pub fn handle_retrieve(
        &self,
        request: &RetrieveRequest,
    ) -> Result<RetrieveResponse, ProviderError> {
        let seed = decode_seed(&request.seed)?;
        let content_id = parse_content_id(&request.data_hash)?;

        let data = self
            .store
            .get_blob(&content_id)?
            .ok_or_else(|| ProviderError::NotFound(request.data_hash.clone()))?;
        let prev_seed = self
            .store
            .chain(&content_id)?
            .ok_or_else(|| ProviderError::NotFound(request.data_hash.clone()))?
            .last_seed;

        let proof = chain_proof(&data, &prev_seed);
        let hash = chain_hash(&proof, &seed);
        self.store.advance_chain(&content_id, &seed)?;

        let mut response = RetrieveResponse {
            data,
            commitment_hash: hex::encode(hash),
            commitment_proof: hex::encode(proof),
            signature: Vec::new(),
        };
        response.sign(request, &self.signing_key);
        Ok(response)
    }

    /// Drop a stored ciphertext and its chain state.
    pub fn handle_delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, ProviderError> {
        let content_id = parse_content_id(&request.data_hash)?;
        let deleted = self.store.delete(&content_id)?;
        debug!(content_id = %content_id, deleted, "Delete request handled");
        Ok(DeleteResponse { deleted })
    }
}

fn decode_seed(seed_hex: &str) -> Result<Vec<u8>, ProviderError> {
    let seed = hex::decode(seed_hex)
        .map_err(|_| ProviderError::BadRequest("seed is not valid hex".to_string()))?;
    if seed.is_empty() {
        return Err(ProviderError::BadRequest("seed must not be empty".to_string()));
    }
    Ok(seed)
}

fn parse_content_id(hash: &str) -> Result<ContentId, ProviderError> {
    ContentId::parse(hash).map_err(|e| ProviderError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_commitments::{
        challenge_index, decode_point, decode_scalar, hash_leaf, verify_chain, verify_opening,
        verify_proof, MerkleProof,
    };
    use tempfile::tempdir;

    fn test_node() -> (ProviderNode, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ProviderStore::open(&dir.path().join("blobs.db")).unwrap();
        let node = ProviderNode::new(store, SigningKey::from_bytes(&[7u8; 32]));
        (node, dir)
    }

    fn store_request(data: &[u8], seed: &[u8]) -> StoreRequest {
        let params = CurveParameters::p256();
        StoreRequest {
            encrypted_data: data.to_vec(),
            curve: params.name().to_string(),
            g: params.g_hex(),
            h: params.h_hex(),
            seed: hex::encode(seed),
        }
    }

    #[test]
    fn test_store_commits_and_signs() {
        let (node, _dir) = test_node();
        let request = store_request(&vec![0xAB; 4096], b"seed-0");

        let response = node.handle_store(&request).unwrap();
        assert!(response.verify_signature(&request, &node.verifying_key()));

        // The commitment opens against the stored data.
        let params = CurveParameters::p256();
        let point = decode_point(&response.commitment).unwrap();
        let randomness = decode_scalar(&response.randomness).unwrap();
        assert!(verify_opening(
            &request.encrypted_data,
            &randomness,
            &point,
            &params
        ));

        // And the chain hash matches the initial round formula.
        let proof = chain_proof(&request.encrypted_data, b"");
        let expected: [u8; 32] = hex::decode(&response.commitment_hash)
            .unwrap()
            .try_into()
            .unwrap();
        assert!(verify_chain(&proof, b"seed-0", &expected));
    }

    #[test]
    fn test_challenge_round_verifies() {
        let (node, _dir) = test_node();
        let data = vec![0x5A; 8192];
        let store_req = store_request(&data, b"seed-0");
        node.handle_store(&store_req).unwrap();

        let params = CurveParameters::p256();
        let chunk_count = 8u32;
        let seed = b"seed-1";
        let index = challenge_index(seed, chunk_count).unwrap();
        let request = ChallengeRequest {
            challenge_hash: ContentId::identify(&data).as_str().to_string(),
            challenge_index: index,
            chunk_size: 1024,
            curve: params.name().to_string(),
            g: params.g_hex(),
            h: params.h_hex(),
            seed: hex::encode(seed),
        };

        let response = node.handle_challenge(&request).unwrap();
        assert!(response.verify_signature(&request, &node.verifying_key()));

        // Merkle proof checks out against the returned root.
        let root: [u8; 32] = hex::decode(&response.merkle_root)
            .unwrap()
            .try_into()
            .unwrap();
        let proof = MerkleProof::from_wire(index, &response.merkle_proof).unwrap();
        assert!(verify_proof(
            &root,
            &hash_leaf(&response.data_chunk),
            index,
            &proof,
            chunk_count
        ));

        // Chunk commitment opens against the revealed chunk.
        let point = decode_point(&response.commitment).unwrap();
        let randomness = decode_scalar(&response.randomness).unwrap();
        assert!(verify_opening(
            &response.data_chunk,
            &randomness,
            &point,
            &params
        ));

        // Chain: proof derives from the stored data and seed-0, hash from seed-1.
        let expected_proof = chain_proof(&data, b"seed-0");
        assert_eq!(response.commitment_proof, hex::encode(expected_proof));
        let hash: [u8; 32] = hex::decode(&response.commitment_hash)
            .unwrap()
            .try_into()
            .unwrap();
        assert!(verify_chain(&expected_proof, seed, &hash));
    }

    #[test]
    fn test_challenge_unknown_content_fails() {
        let (node, _dir) = test_node();
        let params = CurveParameters::p256();
        let request = ChallengeRequest {
            challenge_hash: ContentId::identify(b"never stored").as_str().to_string(),
            challenge_index: 0,
            chunk_size: 1024,
            curve: params.name().to_string(),
            g: params.g_hex(),
            h: params.h_hex(),
            seed: hex::encode(b"seed"),
        };
        assert!(matches!(
            node.handle_challenge(&request),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_challenge_index_out_of_range() {
        let (node, _dir) = test_node();
        let data = vec![1u8; 2048];
        node.handle_store(&store_request(&data, b"seed-0")).unwrap();

        let params = CurveParameters::p256();
        let request = ChallengeRequest {
            challenge_hash: ContentId::identify(&data).as_str().to_string(),
            challenge_index: 2, // only chunks 0 and 1 exist
            chunk_size: 1024,
            curve: params.name().to_string(),
            g: params.g_hex(),
            h: params.h_hex(),
            seed: hex::encode(b"seed-1"),
        };
        assert!(matches!(
            node.handle_challenge(&request),
            Err(ProviderError::Pos(PosError::ChunkIndexOutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_retrieve_extends_chain() {
        let (node, _dir) = test_node();
        let data = vec![0xC3; 3000];
        node.handle_store(&store_request(&data, b"seed-0")).unwrap();

        let request = RetrieveRequest {
            data_hash: ContentId::identify(&data).as_str().to_string(),
            seed: hex::encode(b"seed-1"),
        };
        let response = node.handle_retrieve(&request).unwrap();
        assert_eq!(response.data, data);
        assert!(response.verify_signature(&request, &node.verifying_key()));

        let expected_proof = chain_proof(&data, b"seed-0");
        assert_eq!(response.commitment_proof, hex::encode(expected_proof));

        // A second retrieve chains off seed-1, not seed-0.
        let request2 = RetrieveRequest {
            data_hash: request.data_hash.clone(),
            seed: hex::encode(b"seed-2"),
        };
        let response2 = node.handle_retrieve(&request2).unwrap();
        assert_eq!(
            response2.commitment_proof,
            hex::encode(chain_proof(&data, b"seed-1"))
        );
    }

    #[test]
    fn test_delete() {
        let (node, _dir) = test_node();
        let data = vec![9u8; 1024];
        node.handle_store(&store_request(&data, b"seed-0")).unwrap();

        let request = DeleteRequest {
            data_hash: ContentId::identify(&data).as_str().to_string(),
        };
        assert!(node.handle_delete(&request).unwrap().deleted);
        assert!(!node.handle_delete(&request).unwrap().deleted);
    }

    #[test]
    fn test_dispatch_wraps_errors() {
        let (node, _dir) = test_node();
        let response = node.handle(ProviderRequest::Retrieve(RetrieveRequest {
            data_hash: ContentId::identify(b"missing").as_str().to_string(),
            seed: hex::encode(b"seed"),
        }));
        assert!(matches!(response, ProviderResponse::Error { .. }));
    }
}
