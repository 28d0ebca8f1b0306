//! Mixed hash: the published identifier of a public data blob.
//!
//! Layout of the 32 bytes:
//!
//! ```text
//!  byte 0 bits 7..6 : hash variant (00 = SHA-256, 10 = Keccak-256)
//!  bytes 0..8       : big-endian data length (top two bits masked off)
//!  bytes 8..32      : tail of the Merkle root
//! ```

use dmc_core::constants::SIZE_UNIT_BYTES;
use dmc_core::error::DmcError;
use dmc_core::types::ContentHash;

use crate::hash::{Hash, HashType};

const VARIANT_MASK: u8 = 0b1100_0000;
const KECCAK_BITS: u8 = 0b1000_0000;

/// Pack a Merkle root, the original data length and the hash variant.
pub fn pack(root: &Hash, data_length: u64, hash_type: HashType) -> ContentHash {
    let mut out = *root;
    out[..8].copy_from_slice(&data_length.to_be_bytes());
    out[0] &= !VARIANT_MASK;
    if hash_type == HashType::Keccak256 {
        out[0] |= KECCAK_BITS;
    }
    ContentHash(out)
}

pub fn data_length(hash: &ContentHash) -> u64 {
    let mut len = [0u8; 8];
    len.copy_from_slice(&hash.0[..8]);
    len[0] &= !VARIANT_MASK;
    u64::from_be_bytes(len)
}

pub fn hash_type(hash: &ContentHash) -> Result<HashType, DmcError> {
    match hash.0[0] & VARIANT_MASK {
        0 => Ok(HashType::Sha256),
        KECCAK_BITS => Ok(HashType::Keccak256),
        _ => Err(DmcError::InvalidProof),
    }
}

/// Data size in units of 1/8 GiB, rounded up, at least 1.
pub fn size_eighths(hash: &ContentHash) -> u128 {
    let len = data_length(hash);
    len.div_ceil(SIZE_UNIT_BYTES).max(1) as u128
}

/// True if `root` matches the hash portion of `mixed` (length/variant bytes masked).
pub fn root_matches(mixed: &ContentHash, root: &Hash) -> bool {
    mixed.0[8..] == root[8..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack() {
        let root = [0xffu8; 32];
        let mixed = pack(&root, 5_000, HashType::Keccak256);
        assert_eq!(data_length(&mixed), 5_000);
        assert_eq!(hash_type(&mixed).unwrap(), HashType::Keccak256);
        assert!(root_matches(&mixed, &root));
        assert_eq!(mixed.0[0] & 0b1100_0000, 0b1000_0000);

        let sha = pack(&root, 5_000, HashType::Sha256);
        assert_eq!(hash_type(&sha).unwrap(), HashType::Sha256);
        assert_eq!(sha.0[0] & 0b1100_0000, 0);
    }

    #[test]
    fn unknown_variant_rejected() {
        let mut raw = [0u8; 32];
        raw[0] = 0b0100_0000;
        assert_eq!(hash_type(&ContentHash(raw)), Err(DmcError::InvalidProof));
    }

    #[test]
    fn size_classes() {
        let root = [1u8; 32];
        assert_eq!(size_eighths(&pack(&root, 0, HashType::Sha256)), 1);
        assert_eq!(size_eighths(&pack(&root, 1024, HashType::Sha256)), 1);
        assert_eq!(size_eighths(&pack(&root, SIZE_UNIT_BYTES, HashType::Sha256)), 1);
        assert_eq!(size_eighths(&pack(&root, SIZE_UNIT_BYTES + 1, HashType::Sha256)), 2);
        assert_eq!(size_eighths(&pack(&root, 1 << 30, HashType::Sha256)), 8);
    }
}
