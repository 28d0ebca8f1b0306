//! Truncated-hash Merkle tree used for proof-of-possession challenges.
//!
//! Leaves are 1024-byte blocks of the data (last block zero-padded). Every
//! node keeps only the trailing 16 bytes of its hash. A layer with an odd
//! node count promotes the last node unchanged; in a proof path that case is
//! encoded as a 16-zero-byte sibling, which the verifier skips instead of
//! hashing.
//!
//! A challenge appends a 32-byte block hash (the nonce) to the chosen leaf
//! and recomputes the root along the leaf's path. The supplier picks the
//! leaf giving the smallest such root.

use serde::{Deserialize, Serialize};

use dmc_core::constants::MERKLE_LEAF_SIZE;
use dmc_core::error::DmcError;
use dmc_core::types::ContentHash;

use crate::hash::{calc_hash, half, Hash, HalfHash, HashType};
use crate::mixhash;

const ZERO_HALF: HalfHash = [0u8; 16];

/// Leaf `index` of `data`, zero-padded to the leaf size.
pub fn leaf_bytes(data: &[u8], index: u64) -> Option<[u8; MERKLE_LEAF_SIZE]> {
    let start = (index as usize).checked_mul(MERKLE_LEAF_SIZE)?;
    if start >= data.len() {
        return None;
    }
    let end = (start + MERKLE_LEAF_SIZE).min(data.len());
    let mut leaf = [0u8; MERKLE_LEAF_SIZE];
    leaf[..end - start].copy_from_slice(&data[start..end]);
    Some(leaf)
}

/// `leaf ++ nonce`, the challenged form of a leaf.
pub fn nonce_leaf(leaf: &[u8], nonce: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(leaf.len() + nonce.len());
    out.extend_from_slice(leaf);
    out.extend_from_slice(nonce);
    out
}

/// Recompute a root from a leaf and its sibling path, walking `path.len()`
/// levels. Zero siblings mark promoted nodes and are skipped.
pub fn root_from_path(hash_type: HashType, path: &[HalfHash], leaf_index: u64, leaf: &[u8]) -> Hash {
    let mut current = calc_hash(hash_type, leaf);
    let mut index = leaf_index;
    for sibling in path {
        if *sibling != ZERO_HALF {
            let mut pair = [0u8; 32];
            if index % 2 == 0 {
                pair[..16].copy_from_slice(&half(&current));
                pair[16..].copy_from_slice(sibling);
            } else {
                pair[..16].copy_from_slice(sibling);
                pair[16..].copy_from_slice(&half(&current));
            }
            current = calc_hash(hash_type, &pair);
        }
        index /= 2;
    }
    current
}

/// Everything a supplier submits for a show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShowProof {
    pub leaf_index: u64,
    pub path: Vec<HalfHash>,
    pub leaf: Vec<u8>,
    /// Root recomputed from `leaf ++ nonce`.
    pub proof_root: Hash,
}

/// JSON form of a tree, reloadable without the original data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleTreeData {
    pub hash_type: HashType,
    pub tree: Vec<Vec<String>>,
    pub root: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    hash_type: HashType,
    leaves: Vec<HalfHash>,
    /// Full hash of the most recently added leaf; the root of a one-leaf tree.
    last_leaf_full: Hash,
    layers: Vec<Vec<HalfHash>>,
    root: Hash,
}

fn hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_prefixed<const N: usize>(s: &str) -> Result<[u8; N], DmcError> {
    let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| DmcError::Serialization(e.to_string()))?;
    if raw.len() != N {
        return Err(DmcError::Serialization(format!("expected {N} bytes, got {}", raw.len())));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&raw);
    Ok(out)
}

impl MerkleTree {
    pub fn new(hash_type: HashType) -> Self {
        Self {
            hash_type,
            leaves: Vec::new(),
            last_leaf_full: [0u8; 32],
            layers: Vec::new(),
            root: [0u8; 32],
        }
    }

    /// Split `data` into leaves and build the tree.
    pub fn from_data(hash_type: HashType, data: &[u8]) -> Self {
        let mut tree = Self::new(hash_type);
        for chunk in data.chunks(MERKLE_LEAF_SIZE) {
            let mut leaf = [0u8; MERKLE_LEAF_SIZE];
            leaf[..chunk.len()].copy_from_slice(chunk);
            tree.add_leaf(&leaf);
        }
        tree.calc_tree();
        tree
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn add_leaf(&mut self, leaf: &[u8]) {
        let full = calc_hash(self.hash_type, leaf);
        self.last_leaf_full = full;
        self.leaves.push(half(&full));
    }

    pub fn calc_tree(&mut self) {
        self.layers.clear();
        let mut current = self.leaves.clone();
        self.layers.push(current.clone());
        let mut root = if current.len() == 1 { self.last_leaf_full } else { [0u8; 32] };
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                if let [left, right] = pair {
                    let mut buf = [0u8; 32];
                    buf[..16].copy_from_slice(left);
                    buf[16..].copy_from_slice(right);
                    root = calc_hash(self.hash_type, &buf);
                    next.push(half(&root));
                } else {
                    next.push(pair[0]);
                }
            }
            self.layers.push(next.clone());
            current = next;
        }
        self.root = root;
    }

    pub fn root(&self) -> &Hash {
        &self.root
    }

    pub fn leaf_count(&self) -> u64 {
        self.layers.first().map(|l| l.len() as u64).unwrap_or(0)
    }

    /// Root packed with the data length and variant.
    pub fn mixed_root(&self, data_length: u64) -> ContentHash {
        mixhash::pack(&self.root, data_length, self.hash_type)
    }

    /// Sibling path for `index`, or `None` if the leaf does not exist.
    pub fn get_path(&self, index: u64) -> Option<Vec<HalfHash>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut cur = index as usize;
        let mut path = Vec::new();
        for layer in &self.layers {
            if layer.len() < 2 {
                break;
            }
            let sibling = if cur % 2 == 1 {
                layer[cur - 1]
            } else {
                layer.get(cur + 1).copied().unwrap_or(ZERO_HALF)
            };
            path.push(sibling);
            cur /= 2;
        }
        Some(path)
    }

    pub fn proof_by_path(&self, path: &[HalfHash], leaf_index: u64, leaf: &[u8]) -> Hash {
        root_from_path(self.hash_type, path, leaf_index, leaf)
    }

    pub fn verify(&self, path: &[HalfHash], leaf_index: u64, leaf: &[u8]) -> bool {
        self.proof_by_path(path, leaf_index, leaf) == self.root
    }

    /// Build the show proof for one leaf of `data` under `nonce`.
    pub fn prove(&self, data: &[u8], leaf_index: u64, nonce: &[u8; 32]) -> Option<ShowProof> {
        let leaf = leaf_bytes(data, leaf_index)?;
        let path = self.get_path(leaf_index)?;
        let proof_root = self.proof_by_path(&path, leaf_index, &nonce_leaf(&leaf, nonce));
        Some(ShowProof { leaf_index, path, leaf: leaf.to_vec(), proof_root })
    }

    /// Try every leaf and keep the one whose nonce root sorts lowest.
    pub fn find_min_proof(&self, data: &[u8], nonce: &[u8; 32]) -> Option<ShowProof> {
        (0..self.leaf_count())
            .filter_map(|i| self.prove(data, i, nonce))
            .min_by(|a, b| a.proof_root.cmp(&b.proof_root))
    }

    pub fn save(&self) -> MerkleTreeData {
        MerkleTreeData {
            hash_type: self.hash_type,
            tree: self
                .layers
                .iter()
                .map(|layer| layer.iter().map(|h| hex_prefixed(h)).collect())
                .collect(),
            root: hex_prefixed(&self.root),
        }
    }

    pub fn load(data: &MerkleTreeData) -> Result<Self, DmcError> {
        let layers = data
            .tree
            .iter()
            .map(|layer| layer.iter().map(|s| decode_prefixed::<16>(s)).collect())
            .collect::<Result<Vec<Vec<HalfHash>>, DmcError>>()?;
        let root = decode_prefixed::<32>(&data.root)?;
        Ok(Self {
            hash_type: data.hash_type,
            leaves: layers.first().cloned().unwrap_or_default(),
            last_leaf_full: [0u8; 32],
            layers,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_data(rng: &mut rand::rngs::StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| rng.gen()).collect()
    }

    #[test]
    fn every_leaf_verifies() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for leaves in [1usize, 2, 3, 5, 7, 8, 13] {
            for hash_type in [HashType::Sha256, HashType::Keccak256] {
                let data = random_data(&mut rng, leaves * MERKLE_LEAF_SIZE - 100);
                let tree = MerkleTree::from_data(hash_type, &data);
                assert_eq!(tree.leaf_count(), leaves as u64);
                for i in 0..tree.leaf_count() {
                    let path = tree.get_path(i).unwrap();
                    let leaf = leaf_bytes(&data, i).unwrap();
                    assert!(tree.verify(&path, i, &leaf), "leaf {i} of {leaves}");
                }
            }
        }
    }

    #[test]
    fn odd_node_is_promoted_not_duplicated() {
        let data = vec![9u8; 3 * MERKLE_LEAF_SIZE];
        let tree = MerkleTree::from_data(HashType::Sha256, &data);
        // leaf 2 has no right sibling on the first layer
        let path = tree.get_path(2).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], ZERO_HALF);
        // the promoted node equals the leaf hash itself
        assert_eq!(tree.layers[1][1], tree.layers[0][2]);
    }

    #[test]
    fn tampered_leaf_fails() {
        let data = vec![1u8; 4 * MERKLE_LEAF_SIZE];
        let tree = MerkleTree::from_data(HashType::Keccak256, &data);
        let path = tree.get_path(1).unwrap();
        let mut leaf = leaf_bytes(&data, 1).unwrap();
        leaf[0] ^= 1;
        assert!(!tree.verify(&path, 1, &leaf));
        let other = MerkleTree::from_data(HashType::Sha256, &data);
        assert!(!other.verify(&path, 1, &leaf_bytes(&data, 1).unwrap()));
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let data = b"tiny file".to_vec();
        let tree = MerkleTree::from_data(HashType::Sha256, &data);
        let leaf = leaf_bytes(&data, 0).unwrap();
        assert_eq!(*tree.root(), calc_hash(HashType::Sha256, &leaf));
        assert!(tree.get_path(0).unwrap().is_empty());
        assert!(tree.verify(&[], 0, &leaf));
    }

    #[test]
    fn out_of_range_path_is_none() {
        let tree = MerkleTree::from_data(HashType::Sha256, &[0u8; 10]);
        assert!(tree.get_path(1).is_none());
    }

    #[test]
    fn mixed_root_masks_back_to_tree_root() {
        let data = vec![3u8; 5 * MERKLE_LEAF_SIZE + 1];
        let tree = MerkleTree::from_data(HashType::Keccak256, &data);
        let mixed = tree.mixed_root(data.len() as u64);
        assert!(mixhash::root_matches(&mixed, tree.root()));
        assert_eq!(mixhash::data_length(&mixed), data.len() as u64);
        assert_eq!(mixhash::hash_type(&mixed).unwrap(), HashType::Keccak256);
    }

    #[test]
    fn min_proof_is_minimal_and_consistent() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let data = random_data(&mut rng, 6 * MERKLE_LEAF_SIZE);
        let tree = MerkleTree::from_data(HashType::Sha256, &data);
        let nonce = [0x5au8; 32];
        let best = tree.find_min_proof(&data, &nonce).unwrap();
        for i in 0..tree.leaf_count() {
            let p = tree.prove(&data, i, &nonce).unwrap();
            assert!(best.proof_root <= p.proof_root);
        }
        let recomputed = root_from_path(
            HashType::Sha256,
            &best.path,
            best.leaf_index,
            &nonce_leaf(&best.leaf, &nonce),
        );
        assert_eq!(recomputed, best.proof_root);
        // the raw leaf still proves membership
        assert!(tree.verify(&best.path, best.leaf_index, &best.leaf));
    }

    #[test]
    fn save_load_keeps_paths_and_root() {
        let data = vec![8u8; 9 * MERKLE_LEAF_SIZE];
        let tree = MerkleTree::from_data(HashType::Keccak256, &data);
        let json = serde_json::to_string(&tree.save()).unwrap();
        let loaded = MerkleTree::load(&serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(loaded.root(), tree.root());
        for i in 0..tree.leaf_count() {
            assert_eq!(loaded.get_path(i), tree.get_path(i));
        }
    }
}
