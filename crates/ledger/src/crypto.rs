//! Domain-separated hashing for the append-only log

use crate::Hash32;

const DOMAIN_LEAF: u8 = 0x00;
const DOMAIN_INTERNAL: u8 = 0x01;
const DOMAIN_ROOT_SIGNATURE: &[u8] = b"trustkv-root";

/// Digest of a log entry: H(index_be || key_len_be || key || value)
///
/// The key length prefix keeps `(key, value)` boundaries unambiguous.
pub fn item_digest(index: u64, key: &[u8], value: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&index.to_be_bytes());
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize().into()
}

/// leaf = H(0x00 || digest)
pub fn hash_leaf(digest: Hash32) -> Hash32 {
    let mut data = [0u8; 1 + 32];
    data[0] = DOMAIN_LEAF;
    data[1..].copy_from_slice(&digest);
    blake3::hash(&data).into()
}

/// node = H(0x01 || left || right)
pub fn hash_internal(left: Hash32, right: Hash32) -> Hash32 {
    let mut data = [0u8; 1 + 32 + 32];
    data[0] = DOMAIN_INTERNAL;
    data[1..33].copy_from_slice(&left);
    data[33..].copy_from_slice(&right);
    blake3::hash(&data).into()
}

/// Root of the empty log: H("")
pub fn empty_root() -> Hash32 {
    blake3::hash(&[]).into()
}

/// Message signed by a server that vouches for a root.
pub fn root_signing_message(database: &str, index: u64, hash: &Hash32) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_ROOT_SIGNATURE);
    hasher.update(&(database.len() as u64).to_be_bytes());
    hasher.update(database.as_bytes());
    hasher.update(&index.to_be_bytes());
    hasher.update(hash);
    hasher.finalize().into()
}
