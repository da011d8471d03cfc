use ledger::{Item, Proof, ProofError};

use crate::root::Root;

/// Checks a server proof against a trusted root.
///
/// On success returns the root implied by the proof. Implementations must
/// not have side effects; committing the returned root is the caller's job.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &Proof, item: &Item, trusted: &Root) -> Result<Root, ProofError>;
}

/// Inclusion + consistency verification over the Merkle log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogVerifier;

impl ProofVerifier for LogVerifier {
    fn verify(&self, proof: &Proof, item: &Item, trusted: &Root) -> Result<Root, ProofError> {
        ledger::verify_proof(proof, item, trusted.index(), trusted.hash())?;
        Ok(Root::new(
            trusted.database(),
            proof.new_root_index,
            proof.new_root_hash,
        ))
    }
}
