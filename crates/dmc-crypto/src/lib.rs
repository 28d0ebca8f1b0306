pub mod hash;
pub mod merkle;
pub mod mixhash;

pub use hash::{calc_hash, half, Hash, HalfHash, HashType};
pub use merkle::{leaf_bytes, nonce_leaf, root_from_path, MerkleTree, MerkleTreeData, ShowProof};
