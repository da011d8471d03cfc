//! Core types for the authenticated log

use serde::{Deserialize, Serialize};

use crate::crypto;

/// 32-byte hash
pub type Hash32 = [u8; 32];

/// A committed log entry.
///
/// `index` is the 0-based leaf position of the entry in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub index: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(index: u64, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Digest covered by the log leaf for this entry
    pub fn digest(&self) -> Hash32 {
        crypto::item_digest(self.index, &self.key, &self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Root of the log at a given size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of entries the root commits to
    pub index: u64,
    pub hash: Hash32,
}

/// Sibling hashes carried by a proof.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPath {
    /// Leaf-to-root audit path of the entry under the new root
    pub inclusion: Vec<Hash32>,
    /// Hashes linking the client's trusted root to the new root
    pub consistency: Vec<Hash32>,
}

/// Inclusion + consistency proof for a single entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub leaf_index: u64,
    pub leaf_digest: Hash32,
    pub new_root_index: u64,
    pub new_root_hash: Hash32,
    pub path: ProofPath,
}

impl Proof {
    pub fn new_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            index: self.new_root_index,
            hash: self.new_root_hash,
        }
    }
}
