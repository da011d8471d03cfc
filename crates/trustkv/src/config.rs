//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;

use crate::error::{ClientError, Result};

/// How a client obtains the first trusted root of a database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BootstrapPolicy {
    /// Accept the server's current root without proof. This establishes
    /// trust, it does not prove it: a server that lies on first contact
    /// goes undetected until a client with an independent root compares.
    #[default]
    TrustOnFirstUse,
    /// Accept the server's current root only if signed by this key
    SignedBy(VerifyingKey),
    /// Never fetch a first root; roots must be pinned up front
    Pinned,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub server_port: u16,
    /// Attach the bearer token obtained by `login` to every call
    pub with_auth_token: bool,
    pub database: String,
    pub bootstrap: BootstrapPolicy,
    pub request_timeout: Duration,
    /// Persist trusted roots in this JSON file
    pub root_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "localhost".to_string(),
            server_port: 3322,
            with_auth_token: true,
            database: ledger::DEFAULT_DATABASE.to_string(),
            bootstrap: BootstrapPolicy::default(),
            request_timeout: Duration::from_secs(30),
            root_file: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TRUSTKV_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(url) = var("TRUSTKV_SERVER_URL") {
            cfg.server_url = url;
        }
        if let Some(port) = var("TRUSTKV_SERVER_PORT") {
            cfg.server_port = port.parse().map_err(|_| {
                ClientError::Config(format!("TRUSTKV_SERVER_PORT: invalid port {port}"))
            })?;
        }
        if let Some(flag) = var("TRUSTKV_WITH_AUTH_TOKEN") {
            cfg.with_auth_token = parse_flag(&flag);
        }
        if let Some(database) = var("TRUSTKV_DATABASE") {
            cfg.database = database;
        }
        if let Some(path) = var("TRUSTKV_ROOT_FILE") {
            cfg.root_file = Some(PathBuf::from(path));
        }
        if let Some(key) = var("TRUSTKV_SERVER_KEY") {
            cfg.bootstrap = BootstrapPolicy::SignedBy(parse_verifying_key(&key)?);
        }
        if let Some(secs) = var("TRUSTKV_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                ClientError::Config(format!("TRUSTKV_TIMEOUT_SECS: invalid value {secs}"))
            })?;
            cfg.request_timeout = Duration::from_secs(secs);
        }

        if cfg.database.is_empty() {
            return Err(ClientError::Config("database name must not be empty".into()));
        }

        Ok(cfg)
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_server_port(mut self, server_port: u16) -> Self {
        self.server_port = server_port;
        self
    }

    pub fn with_auth_token(mut self, with_auth_token: bool) -> Self {
        self.with_auth_token = with_auth_token;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapPolicy) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_root_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_file = Some(path.into());
        self
    }

    pub fn base_url(&self) -> String {
        if self.server_url.starts_with("http://") || self.server_url.starts_with("https://") {
            format!("{}:{}", self.server_url.trim_end_matches('/'), self.server_port)
        } else {
            format!("http://{}:{}", self.server_url, self.server_port)
        }
    }
}

/// Parse a hex encoded ed25519 public key
pub fn parse_verifying_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| ClientError::Config(format!("server key: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ClientError::Config("server key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| ClientError::Config(format!("server key: {e}")))
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_flag(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "yes" | "YES")
}
