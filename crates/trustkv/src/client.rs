//! Verified key-value protocol
//!
//! Safe operations run snapshot → remote call → verify → commit as one
//! critical section per database, so two callers can never both commit a
//! root derived from the same stale snapshot. Raw and batch operations
//! take no protocol lock and are NOT verified.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ed25519_dalek::Signature;
use ledger::wire::{
    self, DatabaseListResponse, DatabaseRequest, Empty, GetBatchRequest, GetRequest,
    IndexResponse, ItemListResponse, ItemResponse, LoginRequest, LoginResponse, Operation,
    ProofResponse, RootResponse, SafeGetRequest, SafeItemResponse, SafeSetRequest,
    SetBatchRequest, SetRequest, UseDatabaseResponse,
};
use ledger::{Item, KeyValue, Proof, ProofError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BootstrapPolicy, ClientConfig};
use crate::content::Content;
use crate::error::{ClientError, Result, VerificationError};
use crate::http::HttpTransport;
use crate::root::{FileRootStore, InMemoryRootStore, Root, RootStore};
use crate::session::Session;
use crate::transport::{Transport, TransportError};
use crate::verifier::{LogVerifier, ProofVerifier};

/// Client bound to one transport, one root store and one verifier.
///
/// Independent handles share nothing; a handle itself is `Sync` and may be
/// used from many threads at once.
pub struct ClientHandle<
    T: Transport,
    R: RootStore = InMemoryRootStore,
    V: ProofVerifier = LogVerifier,
> {
    transport: T,
    roots: R,
    verifier: V,
    session: RwLock<Session>,
    with_auth_token: bool,
    bootstrap: BootstrapPolicy,
    db_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<T: Transport> ClientHandle<T> {
    /// Client with in-memory roots and the Merkle log verifier
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self::with_parts(transport, InMemoryRootStore::new(), LogVerifier, config)
    }
}

impl ClientHandle<HttpTransport> {
    /// HTTP client keeping roots in memory
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url(), config.request_timeout)
            .map_err(ClientError::Transport)?;
        Ok(Self::new(transport, config))
    }
}

impl ClientHandle<HttpTransport, FileRootStore> {
    /// HTTP client persisting roots to `config.root_file`
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let path = config
            .root_file
            .as_ref()
            .ok_or_else(|| ClientError::Config("root_file is not set".into()))?;
        let roots = FileRootStore::open(path)?;
        let transport = HttpTransport::new(&config.base_url(), config.request_timeout)
            .map_err(ClientError::Transport)?;
        Ok(Self::with_parts(transport, roots, LogVerifier, config))
    }
}

impl<T: Transport, R: RootStore, V: ProofVerifier> ClientHandle<T, R, V> {
    pub fn with_parts(transport: T, roots: R, verifier: V, config: &ClientConfig) -> Self {
        Self {
            transport,
            roots,
            verifier,
            session: RwLock::new(Session::new(config.database.clone())),
            with_auth_token: config.with_auth_token,
            bootstrap: config.bootstrap.clone(),
            db_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn root_store(&self) -> &R {
        &self.roots
    }

    // ---------------- Session ---------------- //

    pub fn active_database(&self) -> String {
        self.session().active_database().to_string()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session().is_logged_in()
    }

    /// Obtain a bearer token.
    ///
    /// A failed login drops any previous token and blocks every other call
    /// locally with [`ClientError::Auth`] until a later `login` succeeds or
    /// `logout` is called. The client never continues unauthenticated.
    pub fn login(&self, user: &str, password: &str) -> Result<()> {
        let res: Result<LoginResponse> = self.call(
            Operation::Login,
            &LoginRequest {
                user: user.to_string(),
                password: password.to_string(),
            },
        );

        let mut session = self.session_mut();
        match res {
            Ok(resp) => {
                session.set_token(resp.token);
                info!(user=%user, "session: logged in");
                Ok(())
            }
            Err(e) => {
                session.fail_login();
                warn!(user=%user, error=%e, "session: login failed");
                Err(e)
            }
        }
    }

    /// Revoke the bearer token; the local session is reset even if the
    /// server call fails. Without a token there is nothing to revoke and
    /// no call is made.
    pub fn logout(&self) -> Result<()> {
        if !self.is_logged_in() {
            self.session_mut().reset();
            return Ok(());
        }
        let res: Result<Empty> = self.call(Operation::Logout, &Empty {});
        self.session_mut().reset();
        res.map(|_| ())
    }

    /// Switch the active database. Roots are kept per database, so the
    /// enforced trust anchor switches with it.
    pub fn use_database(&self, database: &str) -> Result<()> {
        let resp: UseDatabaseResponse = self.call(
            Operation::UseDatabase,
            &DatabaseRequest {
                database: database.to_string(),
            },
        )?;

        let mut session = self.session_mut();
        if let Some(token) = resp.token {
            session.set_token(token);
        }
        session.switch_database(database);
        debug!(database=%database, "session: switched database");
        Ok(())
    }

    pub fn create_database(&self, database: &str) -> Result<()> {
        let _: Empty = self.call(
            Operation::CreateDatabase,
            &DatabaseRequest {
                database: database.to_string(),
            },
        )?;
        Ok(())
    }

    pub fn databases(&self) -> Result<Vec<String>> {
        let resp: DatabaseListResponse = self.call(Operation::DatabaseList, &Empty {})?;
        Ok(resp.databases)
    }

    // ---------------- Roots ---------------- //

    /// Trusted root of the active database, bootstrapping it if absent
    pub fn root(&self) -> Result<Root> {
        let database = self.active_database();
        let lock = self.database_lock(&database);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.trusted_root_locked(&database)
    }

    /// Stored trusted root of the active database, without bootstrapping
    pub fn trusted_root(&self) -> Result<Option<Root>> {
        Ok(self.roots.get(&self.active_database())?)
    }

    /// Fetch the server's current root.
    ///
    /// The fetched root is unauthenticated. It is stored only when no root
    /// is held for the database yet and the bootstrap policy allows it.
    pub fn current_root(&self) -> Result<Root> {
        self.refresh_root(false)
    }

    /// Fetch the server's current root; with `force` it unconditionally
    /// replaces the stored root.
    pub fn refresh_root(&self, force: bool) -> Result<Root> {
        let database = self.active_database();
        let lock = self.database_lock(&database);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = self.roots.get(&database)?;
        if force {
            let fetched = self.fetch_root(&database)?;
            warn!(
                database=%database,
                index=%fetched.index(),
                previous=?stored.as_ref().map(Root::index),
                "trust: trusted root replaced by an unverified refresh"
            );
            self.roots.put(fetched.clone())?;
            return Ok(fetched);
        }

        match stored {
            None if self.bootstrap != BootstrapPolicy::Pinned => self.bootstrap_locked(&database),
            _ => self.fetch_root(&database),
        }
    }

    /// Install an independently obtained root as the trust anchor.
    ///
    /// Without `force` the root must extend the stored one: a lower index is
    /// `RootRegressed`, an equal index with another hash is a fork. Pinning
    /// the stored root again is a no-op.
    pub fn pin_root(&self, root: Root, force: bool) -> Result<()> {
        let lock = self.database_lock(root.database());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = self.roots.get(root.database())?;
        match &stored {
            Some(prev) if *prev == root => return Ok(()),
            Some(prev) if force => {
                warn!(
                    database=%root.database(),
                    index=%root.index(),
                    previous=%prev.index(),
                    "trust: trusted root replaced by a forced pin"
                );
            }
            Some(prev) if !root.is_successor_of(Some(prev)) => {
                warn!(
                    database=%root.database(),
                    index=%root.index(),
                    previous=%prev.index(),
                    "trust: pinned root does not extend the trusted root"
                );
                let err = if root.index() == prev.index() {
                    VerificationError::Proof(ProofError::Forked { index: prev.index() })
                } else {
                    VerificationError::RootRegressed {
                        trusted: prev.index(),
                        claimed: root.index(),
                    }
                };
                return Err(err.into());
            }
            _ => info!(database=%root.database(), index=%root.index(), "trust: pinned root"),
        }

        self.roots.put(root)?;
        Ok(())
    }

    // ---------------- Unverified operations ---------------- //

    /// Unverified read of the logical value stored under `key`
    pub fn raw_get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        Ok(Content::decode(&self.get_stored(key)?)?.payload)
    }

    /// Unverified write of a logical value
    pub fn raw_set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let content = Content::new(value.as_ref()).encode()?;
        self.set_stored(key, content)
    }

    /// Unverified read of the stored bytes, no envelope
    pub fn get_stored(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let resp: ItemResponse = self.call(
            Operation::Get,
            &GetRequest {
                database: self.active_database(),
                key: key.as_ref().to_vec(),
            },
        )?;
        Ok(resp.item.value)
    }

    /// Unverified write of raw bytes, no envelope
    pub fn set_stored(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let _: IndexResponse = self.call(
            Operation::Set,
            &SetRequest {
                database: self.active_database(),
                key: key.as_ref().to_vec(),
                value: value.as_ref().to_vec(),
            },
        )?;
        Ok(())
    }

    /// Unverified batch read of logical values. Keys absent on the server
    /// are omitted from the result.
    pub fn get_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<KeyValue>> {
        self.get_all_stored(keys)?
            .into_iter()
            .map(|kv| -> Result<KeyValue> {
                let content = Content::decode(&kv.value)?;
                Ok(KeyValue::new(kv.key, content.payload))
            })
            .collect()
    }

    /// Unverified batch write of logical values
    pub fn set_all<K: AsRef<[u8]>, W: AsRef<[u8]>>(&self, entries: &[(K, W)]) -> Result<()> {
        let wrapped = entries
            .iter()
            .map(|(k, v)| -> Result<KeyValue> {
                let content = Content::new(v.as_ref()).encode()?;
                Ok(KeyValue::new(k.as_ref(), content))
            })
            .collect::<Result<Vec<_>>>()?;
        self.send_batch(wrapped)
    }

    pub fn get_all_stored<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<KeyValue>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let resp: ItemListResponse = self.call(
            Operation::GetBatch,
            &GetBatchRequest {
                database: self.active_database(),
                keys: keys.iter().map(|k| k.as_ref().to_vec()).collect(),
            },
        )?;
        Ok(resp
            .items
            .into_iter()
            .map(|item| KeyValue::new(item.key, item.value))
            .collect())
    }

    pub fn set_all_stored<K: AsRef<[u8]>, W: AsRef<[u8]>>(&self, entries: &[(K, W)]) -> Result<()> {
        self.send_batch(
            entries
                .iter()
                .map(|(k, v)| KeyValue::new(k.as_ref(), v.as_ref()))
                .collect(),
        )
    }

    // ---------------- Verified operations ---------------- //

    /// Read `key` and accept the value only after its proof verifies
    /// against the trusted root
    pub fn safe_get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        Ok(Content::decode(&self.safe_get_stored(key)?)?.payload)
    }

    /// Write `key` and verify the server's proof for the new entry
    pub fn safe_set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let content = Content::new(value.as_ref()).encode()?;
        self.safe_set_stored(key, content)
    }

    /// Verified read of the stored bytes, no envelope
    pub fn safe_get_stored(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        Ok(self.verified_read(key.as_ref())?.value)
    }

    /// Verified write of raw bytes, no envelope
    pub fn safe_set_stored(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.verified_write(key.as_ref(), value.as_ref())
    }

    fn verified_read(&self, key: &[u8]) -> Result<Item> {
        let database = self.active_database();
        let lock = self.database_lock(&database);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let trusted = self.trusted_root_locked(&database)?;
        let resp: SafeItemResponse = self.call(
            Operation::SafeGet,
            &SafeGetRequest {
                database: database.clone(),
                key: key.to_vec(),
                root_index: trusted.index(),
            },
        )?;

        // the proof must cover the key that was asked for
        let item = Item::new(resp.item.index, key, resp.item.value);
        let new_root = self.verify(&resp.proof, &item, &trusted)?;
        self.commit(&trusted, new_root)?;
        Ok(item)
    }

    fn verified_write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let database = self.active_database();
        let lock = self.database_lock(&database);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let trusted = self.trusted_root_locked(&database)?;
        let resp: ProofResponse = self.call(
            Operation::SafeSet,
            &SafeSetRequest {
                database: database.clone(),
                key: key.to_vec(),
                value: value.to_vec(),
                root_index: trusted.index(),
            },
        )?;

        // a write to a log the client trusts at size n lands at leaf n or later
        if resp.proof.leaf_index < trusted.index() {
            return Err(VerificationError::StaleWrite {
                trusted: trusted.index(),
                claimed: resp.proof.leaf_index,
            }
            .into());
        }

        // never trust an echoed value: rebuild the entry from what was sent
        let item = Item::new(resp.proof.leaf_index, key, value);
        let new_root = self.verify(&resp.proof, &item, &trusted)?;
        if new_root.index() <= trusted.index() {
            return Err(VerificationError::StaleWrite {
                trusted: trusted.index(),
                claimed: new_root.index(),
            }
            .into());
        }
        self.commit(&trusted, new_root)
    }

    fn verify(&self, proof: &Proof, item: &Item, trusted: &Root) -> Result<Root> {
        match self.verifier.verify(proof, item, trusted) {
            Ok(root) if root.database() == trusted.database() => Ok(root),
            Ok(root) => Err(VerificationError::DatabaseMismatch {
                expected: trusted.database().to_string(),
                actual: root.database().to_string(),
            }
            .into()),
            Err(e) => {
                warn!(
                    database=%trusted.database(),
                    trusted_index=%trusted.index(),
                    error=%e,
                    "trust: proof verification failed"
                );
                Err(VerificationError::Proof(e).into())
            }
        }
    }

    /// Advance the stored root; must run under the database lock
    fn commit(&self, trusted: &Root, new_root: Root) -> Result<()> {
        if new_root.is_successor_of(Some(trusted)) {
            debug!(
                database=%new_root.database(),
                from=%trusted.index(),
                to=%new_root.index(),
                "trust: root advanced"
            );
            self.roots.put(new_root)?;
            Ok(())
        } else if new_root == *trusted {
            Ok(())
        } else {
            Err(VerificationError::RootRegressed {
                trusted: trusted.index(),
                claimed: new_root.index(),
            }
            .into())
        }
    }

    fn trusted_root_locked(&self, database: &str) -> Result<Root> {
        match self.roots.get(database)? {
            Some(root) => Ok(root),
            None => self.bootstrap_locked(database),
        }
    }

    fn bootstrap_locked(&self, database: &str) -> Result<Root> {
        let root = match &self.bootstrap {
            BootstrapPolicy::Pinned => {
                return Err(VerificationError::NoTrustedRoot {
                    database: database.to_string(),
                }
                .into())
            }
            BootstrapPolicy::TrustOnFirstUse => {
                let root = self.fetch_root(database)?;
                warn!(
                    database=%database,
                    index=%root.index(),
                    "trust: root accepted on first use without proof"
                );
                root
            }
            BootstrapPolicy::SignedBy(_) => {
                let root = self.fetch_root(database)?;
                info!(database=%database, index=%root.index(), "trust: signed root bootstrapped");
                root
            }
        };
        self.roots.put(root.clone())?;
        Ok(root)
    }

    /// Unauthenticated root fetch; signature checked under `SignedBy`
    fn fetch_root(&self, database: &str) -> Result<Root> {
        let resp: RootResponse = self.call(
            Operation::CurrentRoot,
            &DatabaseRequest {
                database: database.to_string(),
            },
        )?;

        if resp.database != database {
            return Err(VerificationError::DatabaseMismatch {
                expected: database.to_string(),
                actual: resp.database,
            }
            .into());
        }

        if let BootstrapPolicy::SignedBy(key) = &self.bootstrap {
            let signature = resp
                .signature
                .as_deref()
                .ok_or_else(|| VerificationError::BadRootSignature("root is not signed".into()))?;
            let signature = Signature::from_slice(signature)
                .map_err(|e| VerificationError::BadRootSignature(e.to_string()))?;
            let message = ledger::root_signing_message(database, resp.index, &resp.hash);
            key.verify_strict(&message, &signature)
                .map_err(|e| VerificationError::BadRootSignature(e.to_string()))?;
        }

        Ok(Root::new(database, resp.index, resp.hash))
    }

    // ---------------- Plumbing ---------------- //

    fn send_batch(&self, entries: Vec<KeyValue>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _: IndexResponse = self.call(
            Operation::SetBatch,
            &SetBatchRequest {
                database: self.active_database(),
                entries,
            },
        )?;
        Ok(())
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        op: Operation,
        req: &Req,
    ) -> Result<Resp> {
        if op != Operation::Login && self.session().login_failed() {
            return Err(ClientError::Auth(
                "last login failed; log in again or log out first".into(),
            ));
        }

        let body = wire::encode(req).map_err(|e| TransportError::Codec(e.to_string()))?;
        let credential = self.credential();
        let bytes = self.transport.call(op, &body, credential.as_deref())?;
        let resp = wire::decode(&bytes).map_err(|e| TransportError::Codec(e.to_string()))?;
        Ok(resp)
    }

    fn credential(&self) -> Option<String> {
        if !self.with_auth_token {
            return None;
        }
        self.session().auth_token().map(str::to_string)
    }

    fn database_lock(&self, database: &str) -> Arc<Mutex<()>> {
        let mut locks = self.db_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(database.to_string()).or_default().clone()
    }

    fn session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_mut(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}
