//! Transport seam between the client and a server

use std::sync::Arc;

use ledger::wire::{Operation, StatusCode};
use ledger::Service;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned {code}: {message}")]
    Status { code: StatusCode, message: String },

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Request/response call to a remote store.
///
/// Retries, timeouts and connection management belong to implementations;
/// the client never retries a call itself.
pub trait Transport: Send + Sync {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).call(op, request, credential)
    }
}

/// In-process transport that dispatches straight into a [`Service`]
#[derive(Clone)]
pub struct LoopbackTransport {
    service: Arc<Service>,
}

impl LoopbackTransport {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }
}

impl Transport for LoopbackTransport {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        self.service
            .handle(op, request, credential)
            .map_err(|e| TransportError::Status {
                code: e.code,
                message: e.message,
            })
    }
}
