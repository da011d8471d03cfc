//! Client-side trust layer for a verified key-value store
//!
//! The server is not trusted. A [`ClientHandle`] keeps the last verified
//! root of every database and accepts a value returned by a safe operation
//! only when the server's proof ties it to that root.
//!
//! ```no_run
//! use trustkv::{ClientConfig, ClientHandle};
//!
//! # fn main() -> trustkv::Result<()> {
//! let client = ClientHandle::connect(&ClientConfig::from_env()?)?;
//! client.login("immudb", "immudb")?;
//! client.safe_set("greeting", b"hello")?;
//! assert_eq!(client.safe_get("greeting")?, b"hello");
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod content;
mod error;
mod http;
mod root;
mod session;
mod transport;
mod verifier;

pub use client::ClientHandle;
pub use config::{parse_verifying_key, BootstrapPolicy, ClientConfig};
pub use content::Content;
pub use error::{ClientError, Result, VerificationError};
pub use http::HttpTransport;
pub use root::{FileRootStore, InMemoryRootStore, Root, RootStore, RootStoreError};
pub use session::Session;
pub use transport::{LoopbackTransport, Transport, TransportError};
pub use verifier::{LogVerifier, ProofVerifier};

pub use ledger::wire;
pub use ledger::{Hash32, Item, KeyValue, Proof, ProofError};
