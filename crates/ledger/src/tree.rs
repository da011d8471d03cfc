//! Append-only Merkle log.
//!
//! Tree shape and path construction follow RFC 6962 §2.1: the root of `n`
//! leaves splits at `k`, the largest power of two smaller than `n`.

use crate::crypto;
use crate::{Hash32, LedgerError, Result};

#[derive(Clone, Debug, Default)]
pub struct MerkleLog {
    /// Leaf hashes in append order
    leaves: Vec<Hash32>,
}

impl MerkleLog {
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Append an entry digest, returning its leaf index
    pub fn append(&mut self, digest: Hash32) -> u64 {
        let index = self.size();
        self.leaves.push(crypto::hash_leaf(digest));
        index
    }

    pub fn root(&self) -> Hash32 {
        subtree_root(&self.leaves)
    }

    pub fn root_at(&self, size: u64) -> Result<Hash32> {
        Ok(subtree_root(self.prefix(size)?))
    }

    /// Audit path for leaf `index` in the tree of the first `size` leaves
    pub fn inclusion_path(&self, index: u64, size: u64) -> Result<Vec<Hash32>> {
        let leaves = self.prefix(size)?;
        if index >= size {
            return Err(LedgerError::OutOfRange(format!(
                "leaf {index} not in tree of size {size}"
            )));
        }
        let mut path = Vec::new();
        inclusion(index as usize, leaves, &mut path);
        Ok(path)
    }

    /// Consistency path between the trees of `old_size` and `new_size` leaves
    pub fn consistency_path(&self, old_size: u64, new_size: u64) -> Result<Vec<Hash32>> {
        let leaves = self.prefix(new_size)?;
        if old_size > new_size {
            return Err(LedgerError::OutOfRange(format!(
                "old size {old_size} exceeds new size {new_size}"
            )));
        }
        let mut path = Vec::new();
        if old_size > 0 && old_size < new_size {
            subproof(old_size as usize, leaves, true, &mut path);
        }
        Ok(path)
    }

    fn prefix(&self, size: u64) -> Result<&[Hash32]> {
        if size > self.size() {
            return Err(LedgerError::OutOfRange(format!(
                "size {size} exceeds log size {}",
                self.size()
            )));
        }
        Ok(&self.leaves[..size as usize])
    }
}

/// Largest power of two strictly smaller than `n` (n >= 2)
fn split_point(n: usize) -> usize {
    1 << (n - 1).ilog2()
}

fn subtree_root(leaves: &[Hash32]) -> Hash32 {
    match leaves.len() {
        0 => crypto::empty_root(),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            crypto::hash_internal(subtree_root(&leaves[..k]), subtree_root(&leaves[k..]))
        }
    }
}

fn inclusion(m: usize, leaves: &[Hash32], path: &mut Vec<Hash32>) {
    let n = leaves.len();
    if n <= 1 {
        return;
    }
    let k = split_point(n);
    if m < k {
        inclusion(m, &leaves[..k], path);
        path.push(subtree_root(&leaves[k..]));
    } else {
        inclusion(m - k, &leaves[k..], path);
        path.push(subtree_root(&leaves[..k]));
    }
}

fn subproof(m: usize, leaves: &[Hash32], complete: bool, path: &mut Vec<Hash32>) {
    let n = leaves.len();
    if m == n {
        if !complete {
            path.push(subtree_root(leaves));
        }
        return;
    }
    let k = split_point(n);
    if m <= k {
        subproof(m, &leaves[..k], complete, path);
        path.push(subtree_root(&leaves[k..]));
    } else {
        subproof(m - k, &leaves[k..], false, path);
        path.push(subtree_root(&leaves[..k]));
    }
}
