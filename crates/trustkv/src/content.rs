//! Envelope wrapped around user values before they are stored.
//!
//! Proofs cover the encoded envelope, so a verified read yields exactly the
//! bytes that were verified.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Unix seconds at wrap time
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl Content {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        codec()
            .serialize(self)
            .map_err(|e| ClientError::Envelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        codec()
            .deserialize(bytes)
            .map_err(|e| ClientError::Envelope(e.to_string()))
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(64 * 1024 * 1024)
        .reject_trailing_bytes()
}
