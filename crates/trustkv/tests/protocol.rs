use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use ed25519_dalek::SigningKey;
use ledger::wire::{
    self, Operation, ProofResponse, RootResponse, SafeGetRequest, SafeItemResponse,
    SafeSetRequest,
};
use ledger::{Service, ServiceConfig, DEFAULT_DATABASE};
use rand_core::OsRng;
use serde::{de::DeserializeOwned, Serialize};
use trustkv::{
    BootstrapPolicy, ClientConfig, ClientError, ClientHandle, FileRootStore, InMemoryRootStore,
    Item, LogVerifier, LoopbackTransport, Proof, ProofError, ProofVerifier, Root, RootStore,
    Transport, TransportError, VerificationError,
};

const USER: &str = "immudb";
const PASSWORD: &str = "immudb";

type Edit = Box<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// Loopback transport that can rewrite or fail one operation and counts
/// the calls made per operation
struct TestTransport {
    inner: LoopbackTransport,
    target: Option<Operation>,
    request: Option<Edit>,
    response: Option<Edit>,
    failure: Option<TransportError>,
    root_calls: AtomicUsize,
    total_calls: AtomicUsize,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl TestTransport {
    fn new(service: Arc<Service>) -> Self {
        Self {
            inner: LoopbackTransport::new(service),
            target: None,
            request: None,
            response: None,
            failure: None,
            root_calls: AtomicUsize::new(0),
            total_calls: AtomicUsize::new(0),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Answer `op` with `err` without reaching the service
    fn fail(mut self, op: Operation, err: TransportError) -> Self {
        self.target = Some(op);
        self.failure = Some(err);
        self
    }

    /// Replace the response body of `op` with raw bytes
    fn replace_response(mut self, op: Operation, bytes: Vec<u8>) -> Self {
        self.target = Some(op);
        self.response = Some(Box::new(move |_| bytes.clone()));
        self
    }

    fn rewrite_request<M: Serialize + DeserializeOwned>(
        mut self,
        op: Operation,
        edit: impl Fn(&mut M) + Send + Sync + 'static,
    ) -> Self {
        self.target = Some(op);
        self.request = Some(Box::new(move |bytes| rewrite(bytes, &edit)));
        self
    }

    fn rewrite_response<M: Serialize + DeserializeOwned>(
        mut self,
        op: Operation,
        edit: impl Fn(&mut M) + Send + Sync + 'static,
    ) -> Self {
        self.target = Some(op);
        self.response = Some(Box::new(move |bytes| rewrite(bytes, &edit)));
        self
    }

    fn root_calls(&self) -> usize {
        self.root_calls.load(Ordering::SeqCst)
    }

    fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn calls(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }
}

impl Transport for TestTransport {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if op == Operation::CurrentRoot {
            self.root_calls.fetch_add(1, Ordering::SeqCst);
        }
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let targeted = self.target == Some(op);
        if let (Some(err), true) = (&self.failure, targeted) {
            return Err(err.clone());
        }
        let request = match (&self.request, targeted) {
            (Some(edit), true) => edit(request.to_vec()),
            _ => request.to_vec(),
        };
        let response = self.inner.call(op, &request, credential)?;
        Ok(match (&self.response, targeted) {
            (Some(edit), true) => edit(response),
            _ => response,
        })
    }
}

/// Once `replay` is set, answers `safeSet` with the proof of the key's
/// latest existing entry and never appends
struct ReplayWrites {
    inner: LoopbackTransport,
    replay: AtomicBool,
}

impl Transport for ReplayWrites {
    fn call(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        if op != Operation::SafeSet || !self.replay.load(Ordering::SeqCst) {
            return self.inner.call(op, request, credential);
        }

        let req: SafeSetRequest = wire::decode(request).unwrap();
        let get = SafeGetRequest {
            database: req.database,
            key: req.key,
            root_index: req.root_index,
        };
        let bytes = self
            .inner
            .call(Operation::SafeGet, &wire::encode(&get).unwrap(), credential)?;
        let resp: SafeItemResponse = wire::decode(&bytes).unwrap();
        Ok(wire::encode(&ProofResponse { proof: resp.proof }).unwrap())
    }
}

fn rewrite<M: Serialize + DeserializeOwned>(bytes: Vec<u8>, edit: &impl Fn(&mut M)) -> Vec<u8> {
    let mut msg: M = wire::decode(&bytes).unwrap();
    edit(&mut msg);
    wire::encode(&msg).unwrap()
}

fn service() -> Arc<Service> {
    Arc::new(Service::new(ServiceConfig {
        require_auth: true,
        users: vec![(USER.to_string(), PASSWORD.to_string())],
        signing_key: None,
    }))
}

fn open_service() -> Arc<Service> {
    Arc::new(Service::new(ServiceConfig {
        require_auth: false,
        users: vec![(USER.to_string(), PASSWORD.to_string())],
        signing_key: None,
    }))
}

fn signed_service(key: SigningKey) -> Arc<Service> {
    Arc::new(Service::new(ServiceConfig {
        require_auth: true,
        users: vec![(USER.to_string(), PASSWORD.to_string())],
        signing_key: Some(key),
    }))
}

fn client_with<T: Transport>(transport: T, config: &ClientConfig) -> ClientHandle<T> {
    let client = ClientHandle::new(transport, config);
    client.login(USER, PASSWORD).unwrap();
    client
}

fn client(service: &Arc<Service>) -> ClientHandle<TestTransport> {
    client_with(TestTransport::new(service.clone()), &ClientConfig::new())
}

fn server_root(service: &Service, database: &str) -> Root {
    let checkpoint = service.current_root(database).unwrap();
    Root::new(database, checkpoint.index, checkpoint.hash)
}

#[test]
fn test_safe_roundtrip_and_raw_agree() {
    let service = service();
    let client = client(&service);

    client.safe_set("k", [1u8, 2, 3]).unwrap();

    assert_eq!(client.safe_get("k").unwrap(), vec![1, 2, 3]);
    assert_eq!(client.raw_get("k").unwrap(), vec![1, 2, 3]);
    // the stored bytes carry the envelope
    assert_ne!(client.get_stored("k").unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_latest_write_wins() {
    let service = service();
    let client = client(&service);

    client.safe_set("k", "v1").unwrap();
    client.raw_set("other", "x").unwrap();
    client.safe_set("k", "v2").unwrap();

    assert_eq!(client.safe_get("k").unwrap(), b"v2");
    assert_eq!(client.safe_get("other").unwrap(), b"x");
}

#[test]
fn test_stored_variants_skip_envelope() {
    let service = service();
    let client = client(&service);

    client.safe_set_stored("k", b"plain").unwrap();
    assert_eq!(client.safe_get_stored("k").unwrap(), b"plain");
    assert_eq!(client.get_stored("k").unwrap(), b"plain");
    assert_matches!(client.safe_get("k"), Err(ClientError::Envelope(_)));

    client.set_stored("raw", b"bytes").unwrap();
    assert_eq!(client.get_stored("raw").unwrap(), b"bytes");
}

#[test]
fn test_trusted_root_is_monotonic() {
    let service = service();
    let client = client(&service);
    assert!(client.trusted_root().unwrap().is_none());

    let mut last = client.root().unwrap().index();
    assert_eq!(last, 0);

    for i in 0..20u32 {
        let key = format!("key-{}", i % 4);
        if i % 3 == 0 {
            client.raw_set(&key, i.to_be_bytes()).unwrap();
        } else {
            client.safe_set(&key, i.to_be_bytes()).unwrap();
        }
        if i > 0 {
            client.safe_get(&key).unwrap();
        }

        let index = client.trusted_root().unwrap().unwrap().index();
        assert!(index >= last, "root went from {last} to {index}");
        last = index;
    }

    assert_eq!(client.root().unwrap(), server_root(&service, DEFAULT_DATABASE));
}

#[test]
fn test_repeated_read_reconfirms_root() {
    let service = service();
    let client = client(&service);
    client.safe_set("k", "v").unwrap();

    let before = client.trusted_root().unwrap().unwrap();
    client.safe_get("k").unwrap();
    client.safe_get("k").unwrap();
    assert_eq!(client.trusted_root().unwrap().unwrap(), before);
}

#[test]
fn test_tampered_inclusion_path_is_rejected() {
    let service = service();
    let seed = client(&service);
    seed.safe_set("a", "1").unwrap();
    seed.safe_set("b", "2").unwrap();

    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.proof.path.inclusion[0][0] ^= 1,
    );
    let client = client_with(transport, &ClientConfig::new());
    let trusted = client.root().unwrap();

    let err = client.safe_get("a").unwrap_err();
    assert_matches!(
        err,
        ClientError::Verification(VerificationError::Proof(ProofError::Inclusion))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted));
}

#[test]
fn test_tampered_root_hash_is_rejected() {
    let service = service();
    let seed = client(&service);
    seed.safe_set("a", "1").unwrap();

    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.proof.new_root_hash[31] ^= 0x80,
    );
    let client = client_with(transport, &ClientConfig::new());
    client.root().unwrap();
    seed.safe_set("b", "2").unwrap();

    assert_matches!(client.safe_get("a"), Err(ClientError::Verification(_)));
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 1);
}

#[test]
fn test_tampered_consistency_path_is_rejected() {
    let service = service();
    let seed = client(&service);
    for i in 0..3u8 {
        seed.safe_set([i], [i]).unwrap();
    }

    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.proof.path.consistency[0][5] ^= 4,
    );
    let client = client_with(transport, &ClientConfig::new());
    client.root().unwrap();
    for i in 3..6u8 {
        seed.safe_set([i], [i]).unwrap();
    }

    assert_matches!(
        client.safe_get([1u8]),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::Consistency
        )))
    );
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 3);
}

#[test]
fn test_substituted_value_is_rejected() {
    let service = service();
    let seed = client(&service);
    seed.safe_set_stored("k", "honest").unwrap();

    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.item.value = b"forged".to_vec(),
    );
    let client = client_with(transport, &ClientConfig::new());

    assert_matches!(
        client.safe_get_stored("k"),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::DigestMismatch
        )))
    );
}

#[test]
fn test_proof_for_other_key_is_rejected() {
    let service = service();
    let seed = client(&service);
    seed.safe_set("wanted", "1").unwrap();
    seed.safe_set("decoy", "1").unwrap();

    let decoy = service.clone();
    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        move |resp: &mut SafeItemResponse| {
            // answer with the proven entry of a different key
            let db = decoy.current_root(DEFAULT_DATABASE).unwrap();
            resp.item.key = b"decoy".to_vec();
            resp.item.index = db.index - 1;
            resp.proof.leaf_index = db.index - 1;
        },
    );
    let client = client_with(transport, &ClientConfig::new());

    assert_matches!(client.safe_get("wanted"), Err(ClientError::Verification(_)));
}

#[test]
fn test_write_stored_differently_is_rejected() {
    let service = service();
    let transport = TestTransport::new(service.clone()).rewrite_request(
        Operation::SafeSet,
        |req: &mut SafeSetRequest| req.value = b"not what you sent".to_vec(),
    );
    let client = client_with(transport, &ClientConfig::new());
    let trusted = client.root().unwrap();

    assert_matches!(
        client.safe_set_stored("k", "v"),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::DigestMismatch
        )))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted));
}

#[test]
fn test_write_proof_with_shifted_index_is_rejected() {
    let service = service();
    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeSet,
        |resp: &mut ProofResponse| resp.proof.leaf_index += 1,
    );
    let client = client_with(transport, &ClientConfig::new());

    assert_matches!(client.safe_set("k", "v"), Err(ClientError::Verification(_)));
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 0);
}

#[test]
fn test_regressed_root_is_rejected() {
    let service = service();
    let seed = client(&service);
    seed.safe_set("a", "1").unwrap();
    seed.safe_set("b", "2").unwrap();

    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.proof.new_root_index = 1,
    );
    let client = client_with(transport, &ClientConfig::new());
    client.root().unwrap();

    assert_matches!(
        client.safe_get("a"),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::Regressed { trusted: 2, claimed: 1 }
        )))
    );
}

#[test]
fn test_forked_history_is_detected() {
    let honest = service();
    let forked = service();

    let roots = InMemoryRootStore::new();
    let config = ClientConfig::new();

    let client = ClientHandle::with_parts(
        TestTransport::new(honest.clone()),
        roots.clone(),
        LogVerifier,
        &config,
    );
    client.login(USER, PASSWORD).unwrap();
    client.safe_set("k", "honest").unwrap();
    client.safe_set("k", "honest-2").unwrap();

    let forked_seed = self::client(&forked);
    forked_seed.raw_set("k", "forged").unwrap();
    forked_seed.raw_set("k", "forged-2").unwrap();
    forked_seed.raw_set("k", "forged-3").unwrap();

    let switched = ClientHandle::with_parts(
        TestTransport::new(forked.clone()),
        roots.clone(),
        LogVerifier,
        &config,
    );
    switched.login(USER, PASSWORD).unwrap();

    let before = switched.trusted_root().unwrap();
    assert_matches!(
        switched.safe_get("k"),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::Consistency
        )))
    );
    assert_eq!(switched.trusted_root().unwrap(), before);

    // an explicit refresh is the only way to accept the other history
    let refreshed = switched.refresh_root(true).unwrap();
    assert_eq!(refreshed, server_root(&forked, DEFAULT_DATABASE));
    assert_eq!(switched.safe_get("k").unwrap(), b"forged-3");
}

#[test]
fn test_equal_index_with_other_hash_is_fork() {
    let honest = service();
    let forked = service();

    let roots = InMemoryRootStore::new();
    let config = ClientConfig::new();

    let client = ClientHandle::with_parts(
        TestTransport::new(honest.clone()),
        roots.clone(),
        LogVerifier,
        &config,
    );
    client.login(USER, PASSWORD).unwrap();
    client.safe_set("k", "a").unwrap();

    self::client(&forked).raw_set("k", "b").unwrap();
    let switched =
        ClientHandle::with_parts(TestTransport::new(forked), roots, LogVerifier, &config);
    switched.login(USER, PASSWORD).unwrap();

    assert_matches!(
        switched.safe_get("k"),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::Forked { index: 1 }
        )))
    );
}

#[test]
fn test_cold_start_bootstraps_once() {
    let service = service();
    let client = client(&service);

    std::thread::scope(|s| {
        for t in 0..8u8 {
            let client = &client;
            s.spawn(move || {
                for i in 0..5u8 {
                    client.safe_set([t, i], [i]).unwrap();
                }
            });
        }
    });

    assert_eq!(client.transport().root_calls(), 1);
}

#[test]
fn test_concurrent_safe_writes_lose_no_update() {
    let service = service();
    let client = client(&service);

    std::thread::scope(|s| {
        for t in 0..8u8 {
            let client = &client;
            s.spawn(move || {
                for i in 0..10u8 {
                    client.safe_set([t, i], [t, i]).unwrap();
                    client.safe_get([t, i]).unwrap();
                }
            });
        }
    });

    let trusted = client.trusted_root().unwrap().unwrap();
    assert_eq!(trusted.index(), 80);
    assert_eq!(trusted, server_root(&service, DEFAULT_DATABASE));
}

#[test]
fn test_stale_write_is_rejected() {
    struct Unchanged;

    impl ProofVerifier for Unchanged {
        fn verify(&self, _: &Proof, _: &Item, trusted: &Root) -> Result<Root, ProofError> {
            Ok(trusted.clone())
        }
    }

    let service = service();
    let client = ClientHandle::with_parts(
        TestTransport::new(service),
        InMemoryRootStore::new(),
        Unchanged,
        &ClientConfig::new(),
    );
    client.login(USER, PASSWORD).unwrap();

    assert_matches!(
        client.safe_set("k", "v"),
        Err(ClientError::Verification(VerificationError::StaleWrite {
            trusted: 0,
            claimed: 0
        }))
    );
}

#[test]
fn test_pinned_policy_requires_root() {
    let service = service();
    let config = ClientConfig::new().with_bootstrap(BootstrapPolicy::Pinned);
    let client = client_with(TestTransport::new(service.clone()), &config);

    assert_matches!(
        client.safe_get("k"),
        Err(ClientError::Verification(VerificationError::NoTrustedRoot { .. }))
    );

    // fetching the current root does not install it
    let fetched = client.current_root().unwrap();
    assert_eq!(fetched.index(), 0);
    assert!(client.trusted_root().unwrap().is_none());

    client.pin_root(server_root(&service, DEFAULT_DATABASE), false).unwrap();
    client.safe_set("k", "v").unwrap();
    assert_eq!(client.safe_get("k").unwrap(), b"v");
}

#[test]
fn test_signed_bootstrap() {
    let key = SigningKey::generate(&mut OsRng);
    let service = signed_service(key.clone());

    let config = ClientConfig::new().with_bootstrap(BootstrapPolicy::SignedBy(key.verifying_key()));
    let client = client_with(TestTransport::new(service.clone()), &config);
    client.safe_set("k", "v").unwrap();
    assert_eq!(client.safe_get("k").unwrap(), b"v");

    let other = SigningKey::generate(&mut OsRng);
    let config =
        ClientConfig::new().with_bootstrap(BootstrapPolicy::SignedBy(other.verifying_key()));
    let client = client_with(TestTransport::new(service), &config);
    assert_matches!(
        client.safe_get("k"),
        Err(ClientError::Verification(VerificationError::BadRootSignature(_)))
    );
    assert!(client.trusted_root().unwrap().is_none());
}

#[test]
fn test_signed_bootstrap_rejects_unsigned_and_forged_roots() {
    let key = SigningKey::generate(&mut OsRng);
    let config = ClientConfig::new().with_bootstrap(BootstrapPolicy::SignedBy(key.verifying_key()));

    let unsigned = client_with(TestTransport::new(service()), &config);
    assert_matches!(
        unsigned.root(),
        Err(ClientError::Verification(VerificationError::BadRootSignature(_)))
    );

    let transport = TestTransport::new(signed_service(key)).rewrite_response(
        Operation::CurrentRoot,
        |resp: &mut RootResponse| resp.index += 1,
    );
    let forged = client_with(transport, &config);
    assert_matches!(
        forged.root(),
        Err(ClientError::Verification(VerificationError::BadRootSignature(_)))
    );
}

#[test]
fn test_root_for_other_database_is_rejected() {
    let transport = TestTransport::new(service()).rewrite_response(
        Operation::CurrentRoot,
        |resp: &mut RootResponse| resp.database = "elsewhere".to_string(),
    );
    let client = client_with(transport, &ClientConfig::new());

    assert_matches!(
        client.root(),
        Err(ClientError::Verification(VerificationError::DatabaseMismatch { .. }))
    );
}

#[test]
fn test_databases_keep_separate_roots() {
    let service = service();
    let client = client(&service);

    client.safe_set("k", "default").unwrap();
    client.safe_set("k", "default-2").unwrap();

    client.create_database("other").unwrap();
    assert_eq!(client.databases().unwrap(), vec!["defaultdb", "other"]);

    client.use_database("other").unwrap();
    assert_eq!(client.active_database(), "other");
    assert_matches!(client.safe_get("k"), Err(ClientError::NotFound(_)));
    client.safe_set("k", "other").unwrap();

    let other_root = client.trusted_root().unwrap().unwrap();
    assert_eq!(other_root.database(), "other");
    assert_eq!(other_root.index(), 1);

    client.use_database(DEFAULT_DATABASE).unwrap();
    let default_root = client.trusted_root().unwrap().unwrap();
    assert_eq!(default_root.database(), DEFAULT_DATABASE);
    assert_eq!(default_root.index(), 2);
    assert_eq!(client.safe_get("k").unwrap(), b"default-2");
}

#[test]
fn test_use_unknown_database_keeps_session() {
    let service = service();
    let client = client(&service);

    assert_matches!(client.use_database("missing"), Err(ClientError::NotFound(_)));
    assert_eq!(client.active_database(), DEFAULT_DATABASE);
    assert!(client.is_logged_in());
}

#[test]
fn test_calls_require_login() {
    let service = service();
    let client = ClientHandle::new(TestTransport::new(service.clone()), &ClientConfig::new());

    assert!(!client.is_logged_in());
    assert_matches!(client.safe_get("k"), Err(ClientError::Auth(_)));
    assert_matches!(client.raw_set("k", "v"), Err(ClientError::Auth(_)));

    assert_matches!(client.login(USER, "wrong"), Err(ClientError::Auth(_)));
    assert!(!client.is_logged_in());

    client.login(USER, PASSWORD).unwrap();
    client.raw_set("k", "v").unwrap();

    client.logout().unwrap();
    assert!(!client.is_logged_in());
    assert_matches!(client.raw_get("k"), Err(ClientError::Auth(_)));
}

#[test]
fn test_failed_login_drops_previous_token() {
    let service = service();
    let client = client(&service);
    assert!(client.is_logged_in());

    assert_matches!(client.login(USER, "wrong"), Err(ClientError::Auth(_)));
    assert!(!client.is_logged_in());
    assert_matches!(client.raw_get("k"), Err(ClientError::Auth(_)));
}

#[test]
fn test_token_not_sent_when_disabled() {
    let service = service();
    let config = ClientConfig::new().with_auth_token(false);
    let client = client_with(TestTransport::new(service), &config);

    assert!(client.is_logged_in());
    assert_matches!(client.raw_set("k", "v"), Err(ClientError::Auth(_)));
}

#[test]
fn test_missing_key_is_not_found() {
    let service = service();
    let client = client(&service);

    assert_matches!(client.safe_get("missing"), Err(ClientError::NotFound(_)));
    assert_matches!(client.raw_get("missing"), Err(ClientError::NotFound(_)));
    // the bootstrap still happened
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 0);
}

#[test]
fn test_batches() {
    let service = service();
    let client = client(&service);

    let calls = client.transport().total_calls();
    client.set_all::<&str, &str>(&[]).unwrap();
    assert!(client.get_all::<&str>(&[]).unwrap().is_empty());
    assert_eq!(client.transport().total_calls(), calls);

    client.set_all(&[("a", "1"), ("b", "2"), ("a", "3")]).unwrap();
    let values = client.get_all(&["a", "missing", "b"]).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].key, b"a");
    assert_eq!(values[0].value, b"3");
    assert_eq!(values[1].key, b"b");
    assert_eq!(values[1].value, b"2");

    client.set_all_stored(&[("c", "plain")]).unwrap();
    let stored = client.get_all_stored(&["c"]).unwrap();
    assert_eq!(stored[0].value, b"plain");

    // batches are verifiable afterwards
    assert_eq!(client.safe_get("a").unwrap(), b"3");
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 4);
}

#[test]
fn test_roots_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.json");
    let honest = service();
    let config = ClientConfig::new().with_root_file(&path);

    {
        let client = ClientHandle::with_parts(
            TestTransport::new(honest.clone()),
            FileRootStore::open(&path).unwrap(),
            LogVerifier,
            &config,
        );
        client.login(USER, PASSWORD).unwrap();
        client.safe_set("k", "v1").unwrap();
        client.safe_set("k", "v2").unwrap();
    }

    let forked = service();
    let forked_seed = self::client(&forked);
    for value in ["evil", "evil-2", "evil-3"] {
        forked_seed.raw_set("k", value).unwrap();
    }

    let roots = FileRootStore::open(&path).unwrap();
    assert_eq!(roots.get(DEFAULT_DATABASE).unwrap().unwrap().index(), 2);

    let restarted =
        ClientHandle::with_parts(TestTransport::new(forked), roots, LogVerifier, &config);
    restarted.login(USER, PASSWORD).unwrap();
    assert_matches!(restarted.safe_get("k"), Err(ClientError::Verification(_)));
    assert_eq!(restarted.transport().root_calls(), 0);

    let restarted = ClientHandle::with_parts(
        TestTransport::new(honest),
        FileRootStore::open(&path).unwrap(),
        LogVerifier,
        &config,
    );
    restarted.login(USER, PASSWORD).unwrap();
    assert_eq!(restarted.safe_get("k").unwrap(), b"v2");
}

#[test]
fn test_tampered_read_fails_but_raw_read_succeeds() {
    let service = service();
    let transport = TestTransport::new(service.clone()).rewrite_response(
        Operation::SafeGet,
        |resp: &mut SafeItemResponse| resp.proof.new_root_hash[0] ^= 1,
    );
    let client = client_with(transport, &ClientConfig::new());

    client.safe_set("a", [1u8, 2, 3]).unwrap();
    let trusted = client.trusted_root().unwrap();

    assert_matches!(client.safe_get("a"), Err(ClientError::Verification(_)));
    assert_eq!(client.trusted_root().unwrap(), trusted);
    assert_eq!(client.raw_get("a").unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_write_answered_with_old_leaf_is_rejected() {
    let service = service();
    let transport = ReplayWrites {
        inner: LoopbackTransport::new(service.clone()),
        replay: AtomicBool::new(false),
    };
    let client = client_with(transport, &ClientConfig::new());

    client.safe_set_stored("k", "v").unwrap();
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 1);

    // someone else extends the log, then the server stops appending
    self::client(&service).raw_set("other", "x").unwrap();
    client.transport().replay.store(true, Ordering::SeqCst);

    assert_matches!(
        client.safe_set_stored("k", "v"),
        Err(ClientError::Verification(VerificationError::StaleWrite {
            trusted: 1,
            claimed: 0
        }))
    );
    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 1);
    assert_eq!(service.current_root(DEFAULT_DATABASE).unwrap().index, 2);
}

#[test]
fn test_write_after_concurrent_append_is_accepted() {
    let service = service();
    let client = client(&service);
    client.safe_set("k", "v1").unwrap();

    self::client(&service).raw_set("other", "x").unwrap();
    client.safe_set("k", "v2").unwrap();

    assert_eq!(client.trusted_root().unwrap().unwrap().index(), 3);
}

#[test]
fn test_failed_login_blocks_calls_on_open_server() {
    let client = ClientHandle::new(TestTransport::new(open_service()), &ClientConfig::new());

    // an open server accepts calls without any token
    client.raw_set("k", "v").unwrap();

    assert_matches!(client.login(USER, "wrong"), Err(ClientError::Auth(_)));
    let calls = client.transport().total_calls();
    assert_matches!(client.raw_set("k", "other"), Err(ClientError::Auth(_)));
    assert_matches!(client.safe_get("k"), Err(ClientError::Auth(_)));
    assert_matches!(client.databases(), Err(ClientError::Auth(_)));
    assert_eq!(client.transport().total_calls(), calls);

    // an explicit logout returns to unauthenticated use
    client.logout().unwrap();
    assert_eq!(client.transport().calls(Operation::Logout), 0);
    client.raw_set("k", "v2").unwrap();

    assert_matches!(client.login(USER, "wrong"), Err(ClientError::Auth(_)));
    client.login(USER, PASSWORD).unwrap();
    assert_eq!(client.raw_get("k").unwrap(), b"v2");
}

#[test]
fn test_pin_root_cannot_roll_back() {
    let service = service();
    let client = client(&service);
    client.safe_set("a", "1").unwrap();
    client.safe_set("b", "2").unwrap();
    let trusted = client.trusted_root().unwrap().unwrap();
    assert_eq!(trusted.index(), 2);

    let lower = Root::new(DEFAULT_DATABASE, 1, [0u8; 32]);
    assert_matches!(
        client.pin_root(lower.clone(), false),
        Err(ClientError::Verification(VerificationError::RootRegressed {
            trusted: 2,
            claimed: 1
        }))
    );

    let other = Root::new(DEFAULT_DATABASE, 2, [7u8; 32]);
    assert_matches!(
        client.pin_root(other, false),
        Err(ClientError::Verification(VerificationError::Proof(
            ProofError::Forked { index: 2 }
        )))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted.clone()));

    // re-pinning the same root is a no-op
    client.pin_root(trusted, false).unwrap();

    client.pin_root(lower.clone(), true).unwrap();
    assert_eq!(client.trusted_root().unwrap(), Some(lower));
}

#[test]
fn test_pin_root_accepts_newer_root() {
    let service = service();
    let client = client(&service);
    client.safe_set("a", "1").unwrap();
    self::client(&service).raw_set("b", "2").unwrap();

    let newer = server_root(&service, DEFAULT_DATABASE);
    client.pin_root(newer.clone(), false).unwrap();
    assert_eq!(client.trusted_root().unwrap(), Some(newer));
    assert_eq!(client.safe_get("b").unwrap(), b"2");
}

#[test]
fn test_read_timeout_surfaces_as_transport_error() {
    let service = service();
    self::client(&service).safe_set("k", "v").unwrap();

    let transport =
        TestTransport::new(service.clone()).fail(Operation::SafeGet, TransportError::Timeout);
    let client = client_with(transport, &ClientConfig::new());
    let trusted = client.root().unwrap();

    assert_matches!(
        client.safe_get("k"),
        Err(ClientError::Transport(TransportError::Timeout))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted));
    assert_eq!(client.transport().calls(Operation::SafeGet), 1);
}

#[test]
fn test_write_connection_failure_surfaces_as_transport_error() {
    let service = service();
    let transport = TestTransport::new(service.clone()).fail(
        Operation::SafeSet,
        TransportError::Connection("connection refused".into()),
    );
    let client = client_with(transport, &ClientConfig::new());
    let trusted = client.root().unwrap();

    assert_matches!(
        client.safe_set("k", "v"),
        Err(ClientError::Transport(TransportError::Connection(_)))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted));
    assert_eq!(client.transport().calls(Operation::SafeSet), 1);
    assert_eq!(service.current_root(DEFAULT_DATABASE).unwrap().index, 0);
}

#[test]
fn test_undecodable_response_surfaces_as_codec_error() {
    let service = service();
    let transport =
        TestTransport::new(service.clone()).replace_response(Operation::SafeSet, vec![0xff]);
    let client = client_with(transport, &ClientConfig::new());
    let trusted = client.root().unwrap();

    assert_matches!(
        client.safe_set("k", "v"),
        Err(ClientError::Transport(TransportError::Codec(_)))
    );
    assert_eq!(client.trusted_root().unwrap(), Some(trusted));
    assert_eq!(client.transport().calls(Operation::SafeSet), 1);
}
