//! Append-only authenticated log
//!
//! Entries are committed to an RFC 6962 shaped Merkle log. Every read or
//! write can be accompanied by a [`Proof`] that ties the entry to the
//! current root and the current root to any earlier root a client trusts.
//!
//! [`Ledger`] and [`Service`] are an in-memory reference backend used to
//! exercise clients end to end.

mod crypto;
mod service;
mod storage;
mod tree;
mod types;
mod verify;
pub mod wire;

pub use crypto::{empty_root, hash_leaf, item_digest, root_signing_message};
pub use service::{Service, ServiceConfig, ServiceError, DEFAULT_DATABASE};
pub use storage::{InMemoryStorage, Storage};
pub use tree::MerkleLog;
pub use types::{Checkpoint, Hash32, Item, KeyValue, Proof, ProofPath};
pub use verify::{verify_consistency, verify_inclusion, verify_proof, ProofError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Key-value view over a Merkle log
pub struct Ledger<S: Storage = InMemoryStorage> {
    storage: S,
    log: MerkleLog,
}

impl Ledger<InMemoryStorage> {
    pub fn new() -> Self {
        Self::with_storage(InMemoryStorage::new())
    }
}

impl Default for Ledger<InMemoryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> Ledger<S> {
    /// Build a ledger over empty storage
    pub fn with_storage(storage: S) -> Self {
        debug_assert!(storage.is_empty());
        Self {
            storage,
            log: MerkleLog::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.log.size()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn current_root(&self) -> Checkpoint {
        Checkpoint {
            index: self.log.size(),
            hash: self.log.root(),
        }
    }

    /// Append a new entry for `key`
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Item> {
        let item = Item::new(self.log.size(), key, value);
        self.storage.append(item.clone())?;
        self.log.append(item.digest());
        Ok(item)
    }

    /// Latest entry for `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Item>> {
        self.storage.latest(key)
    }

    /// Latest entry for `key` with a proof against the current root that
    /// extends the root of size `trusted_index`
    pub fn safe_get(&self, key: &[u8], trusted_index: u64) -> Result<Option<(Item, Proof)>> {
        self.check_trusted_index(trusted_index)?;
        match self.storage.latest(key)? {
            Some(item) => {
                let proof = self.prove(&item, trusted_index)?;
                Ok(Some((item, proof)))
            }
            None => Ok(None),
        }
    }

    /// Append an entry and prove it against the root of size `trusted_index`
    pub fn safe_set(&mut self, key: &[u8], value: &[u8], trusted_index: u64) -> Result<Proof> {
        self.check_trusted_index(trusted_index)?;
        let item = self.set(key, value)?;
        self.prove(&item, trusted_index)
    }

    /// Append several entries in order
    pub fn batch_set(&mut self, ops: &[(&[u8], &[u8])]) -> Result<Checkpoint> {
        if ops.is_empty() {
            return Err(LedgerError::InvalidArgument("empty batch".into()));
        }
        for (key, value) in ops {
            self.set(key, value)?;
        }
        Ok(self.current_root())
    }

    /// Latest entries for `keys`; absent keys are skipped
    pub fn batch_get(&self, keys: &[&[u8]]) -> Result<Vec<Item>> {
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.storage.latest(key)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub fn prove(&self, item: &Item, trusted_index: u64) -> Result<Proof> {
        let size = self.log.size();
        Ok(Proof {
            leaf_index: item.index,
            leaf_digest: item.digest(),
            new_root_index: size,
            new_root_hash: self.log.root(),
            path: ProofPath {
                inclusion: self.log.inclusion_path(item.index, size)?,
                consistency: self.log.consistency_path(trusted_index, size)?,
            },
        })
    }

    pub fn root_at(&self, index: u64) -> Result<Hash32> {
        self.log.root_at(index)
    }

    fn check_trusted_index(&self, trusted_index: u64) -> Result<()> {
        if trusted_index > self.log.size() {
            return Err(LedgerError::InvalidArgument(format!(
                "trusted index {trusted_index} is ahead of log size {}",
                self.log.size()
            )));
        }
        Ok(())
    }
}
