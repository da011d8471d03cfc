//! Blocking HTTP transport: `POST {base}/rpc/{operation}` with a bincode body

use std::time::Duration;

use ledger::wire::{Operation, StatusCode};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::transport::{Transport, TransportError};

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/rpc/{}", self.base_url, op);

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(request.to_vec());
        if let Some(token) = credential {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().map_err(map_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(map_reqwest);
        }

        let message = response.text().unwrap_or_default();
        Err(TransportError::Status {
            code: StatusCode::from_http_status(status.as_u16()),
            message,
        })
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() || e.is_body() {
        TransportError::Codec(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}
