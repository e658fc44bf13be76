//! BLAKE3 Merkle tree over ciphertext chunks.
//!
//! # Design
//!
//! - Domain-separated hashing: leaf hash = BLAKE3(0x00 || chunk),
//!   internal node hash = BLAKE3(0x01 || left || right)
//! - An odd number of nodes at any level is resolved by duplicating the last
//!   node, so root computation is total for every non-empty chunk count
//! - A proof is an ordered sequence of sibling-hash/direction pairs from the
//!   leaf to the root; verification recomputes the root and compares

use common::messages::{MerkleProofStep, SiblingSide};

use crate::error::{PosError, Result};

/// Domain separator for leaf hashes (prevents second-preimage attacks)
const LEAF_DOMAIN: u8 = 0x00;

/// Domain separator for internal node hashes
const NODE_DOMAIN: u8 = 0x01;

/// Hash a leaf chunk: BLAKE3(0x00 || chunk)
pub fn hash_leaf(chunk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_DOMAIN]);
    hasher.update(chunk);
    *hasher.finalize().as_bytes()
}

/// Hash an internal node: BLAKE3(0x01 || left || right)
pub fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_DOMAIN]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Height of a tree with `leaf_count` leaves under duplicate-last padding.
pub fn tree_height(leaf_count: usize) -> usize {
    let mut width = leaf_count;
    let mut height = 0;
    while width > 1 {
        width = width.div_ceil(2);
        height += 1;
    }
    height
}

/// Inclusion proof for one leaf: sibling hashes and direction flags ordered
/// from the leaf's level up to just below the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Zero-based index of the leaf in the tree
    pub leaf_index: u32,
    /// Sibling hashes along the path from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Direction flags: true = sibling is on the right
    pub directions: Vec<bool>,
}

impl MerkleProof {
    /// Convert to the wire form carried in challenge responses.
    pub fn to_wire(&self) -> Vec<MerkleProofStep> {
        self.siblings
            .iter()
            .zip(&self.directions)
            .map(|(hash, &is_right)| MerkleProofStep {
                direction: if is_right {
                    SiblingSide::Right
                } else {
                    SiblingSide::Left
                },
                hash: hex::encode(hash),
            })
            .collect()
    }

    /// Reconstruct a proof from its wire form.
    pub fn from_wire(leaf_index: u32, steps: &[MerkleProofStep]) -> Result<Self> {
        let mut siblings = Vec::with_capacity(steps.len());
        let mut directions = Vec::with_capacity(steps.len());
        for step in steps {
            let bytes: [u8; 32] = hex::decode(&step.hash)
                .ok()
                .and_then(|v| v.try_into().ok())
                .ok_or_else(|| {
                    PosError::ProofMismatch("sibling hash is not 32 hex-encoded bytes".to_string())
                })?;
            siblings.push(bytes);
            directions.push(step.direction == SiblingSide::Right);
        }
        Ok(Self {
            leaf_index,
            siblings,
            directions,
        })
    }
}

/// Binary Merkle tree stored level by level, leaves first.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree over raw chunks, hashing each into a leaf first.
    pub fn from_chunks(chunks: &[Vec<u8>]) -> Result<Self> {
        let leaf_hashes: Vec<[u8; 32]> = chunks.iter().map(|c| hash_leaf(c)).collect();
        Self::from_leaf_hashes(leaf_hashes)
    }

    /// Build a tree from pre-computed leaf hashes.
    pub fn from_leaf_hashes(leaf_hashes: Vec<[u8; 32]>) -> Result<Self> {
        if leaf_hashes.is_empty() {
            return Err(PosError::EmptyData);
        }

        let mut levels = vec![leaf_hashes];
        while levels.last().map(|level| level.len()).unwrap_or(0) > 1 {
            let current = levels.last().map(Vec::as_slice).unwrap_or_default();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd node count: duplicate the last node as its own sibling.
                let right = pair.get(1).unwrap_or(left);
                next.push(hash_node(left, right));
            }
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The 32-byte Merkle root.
    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    /// The root in hex wire form.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels between a leaf and the root.
    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    /// Hash of the leaf at `index`.
    pub fn leaf_hash(&self, index: u32) -> Result<[u8; 32]> {
        self.levels[0]
            .get(index as usize)
            .copied()
            .ok_or(PosError::ChunkIndexOutOfBounds {
                index,
                max: self.leaf_count() as u32 - 1,
            })
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove(&self, index: u32) -> Result<MerkleProof> {
        if index as usize >= self.leaf_count() {
            return Err(PosError::ChunkIndexOutOfBounds {
                index,
                max: self.leaf_count() as u32 - 1,
            });
        }

        let mut siblings = Vec::with_capacity(self.height());
        let mut directions = Vec::with_capacity(self.height());
        let mut idx = index as usize;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            // A duplicated last node is its own right-hand sibling.
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);
            siblings.push(*sibling);
            directions.push(idx % 2 == 0);
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            siblings,
            directions,
        })
    }
}

/// Verify an inclusion proof against a published root.
///
/// `leaf_count` is the verifier's own record of how many chunks the tree was
/// built over; a proof whose length does not match the implied tree height,
/// an out-of-range index, or direction flags inconsistent with the index all
/// fail structurally before any hashing is compared.
pub fn verify_proof(
    root: &[u8; 32],
    leaf_hash: &[u8; 32],
    index: u32,
    proof: &MerkleProof,
    leaf_count: u32,
) -> bool {
    if proof.leaf_index != index || index >= leaf_count {
        return false;
    }
    let expected_height = tree_height(leaf_count as usize);
    if proof.siblings.len() != expected_height || proof.directions.len() != expected_height {
        return false;
    }

    let mut current = *leaf_hash;
    let mut idx = index as usize;
    for (sibling, &sibling_is_right) in proof.siblings.iter().zip(&proof.directions) {
        // The recorded direction must agree with the index's position.
        if sibling_is_right != (idx % 2 == 0) {
            return false;
        }
        current = if sibling_is_right {
            hash_node(&current, sibling)
        } else {
            hash_node(sibling, &current)
        };
        idx /= 2;
    }

    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8; 100]).collect()
    }

    #[test]
    fn test_single_chunk() {
        let tree = MerkleTree::from_chunks(&chunks(1)).unwrap();
        assert_eq!(tree.height(), 0);

        let proof = tree.prove(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(verify_proof(
            &tree.root(),
            &tree.leaf_hash(0).unwrap(),
            0,
            &proof,
            1
        ));
    }

    #[test]
    fn test_all_proofs_verify() {
        for n in [2usize, 3, 4, 5, 7, 8, 64] {
            let tree = MerkleTree::from_chunks(&chunks(n)).unwrap();
            assert_eq!(tree.height(), tree_height(n));
            for i in 0..n as u32 {
                let proof = tree.prove(i).unwrap();
                assert!(
                    verify_proof(
                        &tree.root(),
                        &tree.leaf_hash(i).unwrap(),
                        i,
                        &proof,
                        n as u32
                    ),
                    "proof {} of {} leaves failed",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        // With 3 leaves, leaf 2 is duplicated as its own sibling at level 0.
        let tree = MerkleTree::from_chunks(&chunks(3)).unwrap();
        let proof = tree.prove(2).unwrap();
        assert_eq!(proof.siblings[0], tree.leaf_hash(2).unwrap());
        assert!(proof.directions[0]);
        assert!(verify_proof(
            &tree.root(),
            &tree.leaf_hash(2).unwrap(),
            2,
            &proof,
            3
        ));
    }

    #[test]
    fn test_tamper_sensitivity() {
        let mut data = chunks(8);
        let tree = MerkleTree::from_chunks(&data).unwrap();
        let proof = tree.prove(3).unwrap();

        // Mutate a single byte of the challenged chunk.
        data[3][0] ^= 0x01;
        let tampered_leaf = hash_leaf(&data[3]);
        assert!(!verify_proof(&tree.root(), &tampered_leaf, 3, &proof, 8));
    }

    #[test]
    fn test_wrong_index_fails() {
        let tree = MerkleTree::from_chunks(&chunks(8)).unwrap();
        let proof = tree.prove(3).unwrap();

        // Proof for leaf 3 presented as leaf 4.
        assert!(!verify_proof(
            &tree.root(),
            &tree.leaf_hash(4).unwrap(),
            4,
            &proof,
            8
        ));
        // Out-of-range index.
        assert!(!verify_proof(
            &tree.root(),
            &tree.leaf_hash(3).unwrap(),
            9,
            &proof,
            8
        ));
    }

    #[test]
    fn test_wrong_proof_length_fails() {
        let tree = MerkleTree::from_chunks(&chunks(8)).unwrap();
        let mut proof = tree.prove(3).unwrap();
        proof.siblings.pop();
        proof.directions.pop();
        assert!(!verify_proof(
            &tree.root(),
            &tree.leaf_hash(3).unwrap(),
            3,
            &proof,
            8
        ));
    }

    #[test]
    fn test_inconsistent_directions_fail() {
        let tree = MerkleTree::from_chunks(&chunks(4)).unwrap();
        let mut proof = tree.prove(0).unwrap();
        proof.directions[0] = false;
        assert!(!verify_proof(
            &tree.root(),
            &tree.leaf_hash(0).unwrap(),
            0,
            &proof,
            4
        ));
    }

    #[test]
    fn test_deterministic_root() {
        let data = chunks(5);
        let a = MerkleTree::from_chunks(&data).unwrap();
        let b = MerkleTree::from_chunks(&data).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_empty_chunks_rejected() {
        assert!(MerkleTree::from_chunks(&[]).is_err());
    }

    #[test]
    fn test_wire_roundtrip() {
        let tree = MerkleTree::from_chunks(&chunks(5)).unwrap();
        let proof = tree.prove(4).unwrap();

        let wire = proof.to_wire();
        let back = MerkleProof::from_wire(4, &wire).unwrap();
        assert_eq!(back, proof);
        assert!(verify_proof(
            &tree.root(),
            &tree.leaf_hash(4).unwrap(),
            4,
            &back,
            5
        ));
    }

    #[test]
    fn test_wire_rejects_bad_hash() {
        let steps = vec![MerkleProofStep {
            direction: SiblingSide::Left,
            hash: "zz".to_string(),
        }];
        assert!(MerkleProof::from_wire(0, &steps).is_err());
    }
}
