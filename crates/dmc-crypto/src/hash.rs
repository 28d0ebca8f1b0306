use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

pub type Hash = [u8; 32];

/// Truncated hash stored in Merkle layers.
pub type HalfHash = [u8; 16];

/// Hash family used to build a Merkle tree. Encoded into the top two bits of
/// a mixed hash (`00` SHA-256, `10` Keccak-256).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Sha256,
    Keccak256,
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashType::Sha256 => write!(f, "sha256"),
            HashType::Keccak256 => write!(f, "keccak256"),
        }
    }
}

impl FromStr for HashType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashType::Sha256),
            "keccak256" | "keccak" => Ok(HashType::Keccak256),
            other => Err(format!("unknown hash type: {other}")),
        }
    }
}

/// Hash arbitrary bytes with the selected family → 32-byte array.
pub fn calc_hash(hash_type: HashType, data: &[u8]) -> Hash {
    match hash_type {
        HashType::Sha256 => Sha256::digest(data).into(),
        HashType::Keccak256 => Keccak256::digest(data).into(),
    }
}

/// Keep the trailing 16 bytes of a full hash.
pub fn half(hash: &Hash) -> HalfHash {
    let mut out = [0u8; 16];
    out.copy_from_slice(&hash[16..]);
    out
}
