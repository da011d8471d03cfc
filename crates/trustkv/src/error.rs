//! Error taxonomy of the client

use ledger::wire::StatusCode;
use ledger::ProofError;
use thiserror::Error;

use crate::root::RootStoreError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Root store error: {0}")]
    RootStore(#[from] RootStoreError),

    #[error("Malformed content envelope: {0}")]
    Envelope(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Status {
                code: StatusCode::NotFound,
                message,
            } => ClientError::NotFound(message),
            TransportError::Status {
                code: StatusCode::Unauthenticated | StatusCode::PermissionDenied,
                message,
            } => ClientError::Auth(message),
            other => ClientError::Transport(other),
        }
    }
}

/// Reasons a safe operation refused a server response.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("{0}")]
    Proof(#[from] ProofError),

    #[error("No trusted root for database {database} and bootstrapping is disabled")]
    NoTrustedRoot { database: String },

    #[error("Root signature rejected: {0}")]
    BadRootSignature(String),

    #[error("Write did not extend the log: trusted index {trusted}, proof index {claimed}")]
    StaleWrite { trusted: u64, claimed: u64 },

    #[error("Root regressed: trusted index {trusted}, proposed index {claimed}")]
    RootRegressed { trusted: u64, claimed: u64 },

    #[error("Root for database {actual} returned for database {expected}")]
    DatabaseMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
