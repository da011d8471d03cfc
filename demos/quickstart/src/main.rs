//! Quickstart: a client that does not trust its server
//!
//! Shows:
//! 1. Verified write and read
//! 2. Server substitutes a value, the client refuses it
//! 3. The unverified read path still returns the forged bytes
//! 4. The trusted root never moved

use std::sync::Arc;

use ledger::wire::{self, Operation, SafeItemResponse};
use ledger::{Service, ServiceConfig};
use trustkv::{ClientConfig, ClientHandle, LoopbackTransport, Transport, TransportError};

const USER: &str = "immudb";
const PASSWORD: &str = "immudb";

/// Server that answers honestly until told to lie about `patient:alice`
struct EvilServer {
    inner: LoopbackTransport,
    lie: std::sync::atomic::AtomicBool,
}

impl Transport for EvilServer {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        let response = self.inner.call(op, request, credential)?;
        if !self.lie.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(response);
        }

        let forged = |value: Vec<u8>| -> Vec<u8> {
            let mut bytes = value;
            if let Some(pos) = find(&bytes, b"glucose: 95") {
                bytes[pos..pos + 11].copy_from_slice(b"glucose: 55");
            }
            bytes
        };

        match op {
            Operation::SafeGet => {
                let mut resp: SafeItemResponse =
                    wire::decode(&response).map_err(|e| TransportError::Codec(e.to_string()))?;
                resp.item.value = forged(resp.item.value);
                wire::encode(&resp).map_err(|e| TransportError::Codec(e.to_string()))
            }
            Operation::Get => {
                let mut resp: wire::ItemResponse =
                    wire::decode(&response).map_err(|e| TransportError::Codec(e.to_string()))?;
                resp.item.value = forged(resp.item.value);
                wire::encode(&resp).map_err(|e| TransportError::Codec(e.to_string()))
            }
            _ => Ok(response),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn main() -> trustkv::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("╔════════════════════════════════════════════════╗");
    println!("║  trustkv - Quickstart                          ║");
    println!("║  Verified reads against an untrusted server    ║");
    println!("╚════════════════════════════════════════════════╝\n");

    let service = Arc::new(Service::new(ServiceConfig {
        require_auth: true,
        users: vec![(USER.to_string(), PASSWORD.to_string())],
        signing_key: None,
    }));
    let server = EvilServer {
        inner: LoopbackTransport::new(service),
        lie: std::sync::atomic::AtomicBool::new(false),
    };

    let client = ClientHandle::new(server, &ClientConfig::new());
    client.login(USER, PASSWORD)?;

    // 1. Verified write and read
    println!("📝 Step 1: Lab writes a test result");
    println!("   ─────────────────────────────────");

    let key = "patient:alice";
    client.safe_set(key, "glucose: 95 mg/dL")?;
    let value = client.safe_get(key)?;
    let root = client.root()?;

    println!("   Value: {}", String::from_utf8_lossy(&value));
    println!("   Trusted root: #{} {}", root.index(), hex::encode(root.hash()));
    println!("   ✓ Write and read both verified\n");

    // 2. Tampering
    println!("😈 Step 2: Server starts lying about the value");
    println!("   ───────────────────────────────────────────");

    client
        .transport()
        .lie
        .store(true, std::sync::atomic::Ordering::SeqCst);

    match client.safe_get(key) {
        Ok(value) => println!("   ✓ Data accepted: {}", String::from_utf8_lossy(&value)),
        Err(e) => println!("   ✗ TAMPERING DETECTED: {e}"),
    }
    println!();

    // 3. Unverified path
    println!("⚠️  Step 3: Unverified read of the same key");
    println!("   ────────────────────────────────────────");

    let raw = client.raw_get(key)?;
    println!("   Value: {}", String::from_utf8_lossy(&raw));
    println!("   ⚠️  raw reads carry no proof and accept anything\n");

    // 4. Root unchanged
    println!("🔒 Step 4: Trusted root after the attack");
    println!("   ──────────────────────────────────────");

    let after = client.root()?;
    println!("   Trusted root: #{} {}", after.index(), hex::encode(after.hash()));
    if after == root {
        println!("   ✓ Forged response never touched the trusted root");
    } else {
        println!("   ✗ Trusted root moved");
    }

    Ok(())
}
