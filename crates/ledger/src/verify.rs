//! Stateless proof verification (RFC 9162 §2.1.3.2 and §2.1.4.2)

use thiserror::Error;

use crate::crypto;
use crate::{Hash32, Item, Proof};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("Item digest does not match proof leaf")]
    DigestMismatch,

    #[error("Item index {item} does not match proof leaf index {proof}")]
    IndexMismatch { item: u64, proof: u64 },

    #[error("Proof root index {claimed} regresses trusted index {trusted}")]
    Regressed { trusted: u64, claimed: u64 },

    #[error("Proof root at index {index} differs from trusted root at the same index")]
    Forked { index: u64 },

    #[error("Inclusion path does not reach the new root")]
    Inclusion,

    #[error("Trusted root is not consistent with the new root")]
    Consistency,
}

/// Check that `item` is included under the proof's new root and that the
/// new root extends the trusted root `(trusted_index, trusted_hash)`.
pub fn verify_proof(
    proof: &Proof,
    item: &Item,
    trusted_index: u64,
    trusted_hash: &Hash32,
) -> Result<(), ProofError> {
    let digest = item.digest();
    if digest != proof.leaf_digest {
        return Err(ProofError::DigestMismatch);
    }
    if item.index != proof.leaf_index {
        return Err(ProofError::IndexMismatch {
            item: item.index,
            proof: proof.leaf_index,
        });
    }
    if proof.new_root_index < trusted_index {
        return Err(ProofError::Regressed {
            trusted: trusted_index,
            claimed: proof.new_root_index,
        });
    }
    if proof.new_root_index == trusted_index && proof.new_root_hash != *trusted_hash {
        return Err(ProofError::Forked { index: trusted_index });
    }

    if !verify_inclusion(
        proof.leaf_index,
        proof.new_root_index,
        crypto::hash_leaf(digest),
        &proof.path.inclusion,
        proof.new_root_hash,
    ) {
        return Err(ProofError::Inclusion);
    }

    if !verify_consistency(
        trusted_index,
        proof.new_root_index,
        *trusted_hash,
        proof.new_root_hash,
        &proof.path.consistency,
    ) {
        return Err(ProofError::Consistency);
    }

    Ok(())
}

pub fn verify_inclusion(
    leaf_index: u64,
    tree_size: u64,
    leaf_hash: Hash32,
    path: &[Hash32],
    root: Hash32,
) -> bool {
    if leaf_index >= tree_size {
        return false;
    }

    let mut fnode = leaf_index;
    let mut snode = tree_size - 1;
    let mut r = leaf_hash;

    for p in path {
        if snode == 0 {
            return false;
        }
        if fnode & 1 == 1 || fnode == snode {
            r = crypto::hash_internal(*p, r);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            r = crypto::hash_internal(r, *p);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    snode == 0 && r == root
}

pub fn verify_consistency(
    old_size: u64,
    new_size: u64,
    old_root: Hash32,
    new_root: Hash32,
    path: &[Hash32],
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == new_size {
        return path.is_empty() && old_root == new_root;
    }
    // the empty log is a prefix of every log
    if old_size == 0 {
        return path.is_empty() && old_root == crypto::empty_root();
    }
    if path.is_empty() {
        return false;
    }

    // a complete old tree is itself the first node of the path
    let mut nodes = Vec::with_capacity(path.len() + 1);
    if old_size.is_power_of_two() {
        nodes.push(old_root);
    }
    nodes.extend_from_slice(path);

    let mut fnode = old_size - 1;
    let mut snode = new_size - 1;
    while fnode & 1 == 1 {
        fnode >>= 1;
        snode >>= 1;
    }

    let mut fr = nodes[0];
    let mut sr = nodes[0];
    for c in &nodes[1..] {
        if snode == 0 {
            return false;
        }
        if fnode & 1 == 1 || fnode == snode {
            fr = crypto::hash_internal(*c, fr);
            sr = crypto::hash_internal(*c, sr);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            sr = crypto::hash_internal(sr, *c);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    fr == old_root && sr == new_root && snode == 0
}
