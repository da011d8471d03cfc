//! Request dispatch over a set of named ledgers
//!
//! The service owns authentication state (users, bearer tokens) and the
//! optional key used to sign roots. It is transport agnostic: callers hand
//! it an operation, an encoded request body and a credential.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::wire::{
    self, DatabaseListResponse, DatabaseRequest, Empty, GetBatchRequest, GetRequest,
    IndexResponse, ItemListResponse, ItemResponse, LoginRequest, LoginResponse, Operation,
    ProofResponse, RootResponse, SafeGetRequest, SafeItemResponse, SafeSetRequest,
    SetBatchRequest, SetRequest, StatusCode, UseDatabaseResponse,
};
use crate::{crypto, Checkpoint, Hash32, Ledger, LedgerError};

pub const DEFAULT_DATABASE: &str = "defaultdb";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: StatusCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl From<LedgerError> for ServiceError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OutOfRange(_) | LedgerError::InvalidArgument(_) => {
                ServiceError::new(StatusCode::InvalidArgument, e.to_string())
            }
            LedgerError::Storage(_) => ServiceError::internal(e.to_string()),
        }
    }
}

type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Clone, Default)]
pub struct ServiceConfig {
    /// Reject every operation but `login` without a valid bearer token
    pub require_auth: bool,
    /// `(user, password)` pairs accepted by `login`
    pub users: Vec<(String, String)>,
    /// Signs roots returned by `currentRoot` when present
    pub signing_key: Option<SigningKey>,
}

pub struct Service {
    databases: RwLock<HashMap<String, Ledger>>,
    users: HashMap<String, Hash32>,
    sessions: RwLock<HashMap<String, String>>,
    require_auth: bool,
    signing_key: Option<SigningKey>,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        let mut databases = HashMap::new();
        databases.insert(DEFAULT_DATABASE.to_string(), Ledger::new());

        let users = config
            .users
            .into_iter()
            .map(|(user, password)| (user, password_hash(&password)))
            .collect();

        Self {
            databases: RwLock::new(databases),
            users,
            sessions: RwLock::new(HashMap::new()),
            require_auth: config.require_auth,
            signing_key: config.signing_key,
        }
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing_key.as_ref().map(SigningKey::verifying_key)
    }

    /// Decode, authorize, dispatch and encode a single call
    pub fn handle(
        &self,
        op: Operation,
        request: &[u8],
        credential: Option<&str>,
    ) -> ServiceResult<Vec<u8>> {
        if op != Operation::Login {
            self.authorize(credential)?;
        }

        match op {
            Operation::Login => respond(&self.login(decode_request(request)?)?),
            Operation::Logout => {
                self.logout(credential)?;
                respond(&Empty {})
            }
            Operation::CurrentRoot => {
                let req: DatabaseRequest = decode_request(request)?;
                respond(&self.signed_root(&req.database)?)
            }
            Operation::CreateDatabase => {
                let req: DatabaseRequest = decode_request(request)?;
                self.create_database(&req.database)?;
                respond(&Empty {})
            }
            Operation::UseDatabase => {
                let req: DatabaseRequest = decode_request(request)?;
                respond(&self.use_database(&req.database, credential)?)
            }
            Operation::DatabaseList => respond(&DatabaseListResponse {
                databases: self.databases()?,
            }),
            Operation::Get => {
                let req: GetRequest = decode_request(request)?;
                let item = self
                    .read_ledger(&req.database, |l| l.get(&req.key))?
                    .ok_or_else(|| ServiceError::not_found("key not found"))?;
                respond(&ItemResponse { item })
            }
            Operation::Set => {
                let req: SetRequest = decode_request(request)?;
                let item = self.write_ledger(&req.database, |l| l.set(&req.key, &req.value))?;
                respond(&IndexResponse { index: item.index })
            }
            Operation::SafeGet => {
                let req: SafeGetRequest = decode_request(request)?;
                let (item, proof) = self
                    .read_ledger(&req.database, |l| l.safe_get(&req.key, req.root_index))?
                    .ok_or_else(|| ServiceError::not_found("key not found"))?;
                respond(&SafeItemResponse { item, proof })
            }
            Operation::SafeSet => {
                let req: SafeSetRequest = decode_request(request)?;
                let proof = self.write_ledger(&req.database, |l| {
                    l.safe_set(&req.key, &req.value, req.root_index)
                })?;
                respond(&ProofResponse { proof })
            }
            Operation::GetBatch => {
                let req: GetBatchRequest = decode_request(request)?;
                let keys: Vec<&[u8]> = req.keys.iter().map(Vec::as_slice).collect();
                let items = self.read_ledger(&req.database, |l| l.batch_get(&keys))?;
                respond(&ItemListResponse { items })
            }
            Operation::SetBatch => {
                let req: SetBatchRequest = decode_request(request)?;
                let ops: Vec<(&[u8], &[u8])> = req
                    .entries
                    .iter()
                    .map(|kv| (kv.key.as_slice(), kv.value.as_slice()))
                    .collect();
                let root = self.write_ledger(&req.database, |l| l.batch_set(&ops))?;
                respond(&IndexResponse {
                    index: root.index - 1,
                })
            }
        }
    }

    pub fn current_root(&self, database: &str) -> ServiceResult<Checkpoint> {
        self.read_ledger(database, |l| Ok(l.current_root()))
    }

    pub fn create_database(&self, database: &str) -> ServiceResult<()> {
        if database.is_empty() {
            return Err(ServiceError::new(
                StatusCode::InvalidArgument,
                "database name must not be empty",
            ));
        }
        let mut databases = self
            .databases
            .write()
            .map_err(|_| ServiceError::internal("database lock poisoned"))?;
        if databases.contains_key(database) {
            return Err(ServiceError::new(
                StatusCode::AlreadyExists,
                format!("database {database} already exists"),
            ));
        }
        databases.insert(database.to_string(), Ledger::new());
        Ok(())
    }

    pub fn databases(&self) -> ServiceResult<Vec<String>> {
        let databases = self
            .databases
            .read()
            .map_err(|_| ServiceError::internal("database lock poisoned"))?;
        let mut names: Vec<String> = databases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn authorize(&self, credential: Option<&str>) -> ServiceResult<()> {
        if !self.require_auth {
            return Ok(());
        }
        let token = credential.ok_or_else(|| ServiceError::unauthenticated("missing credential"))?;
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ServiceError::internal("session lock poisoned"))?;
        if sessions.contains_key(token) {
            Ok(())
        } else {
            Err(ServiceError::unauthenticated("invalid credential"))
        }
    }

    fn login(&self, req: LoginRequest) -> ServiceResult<LoginResponse> {
        match self.users.get(&req.user) {
            Some(expected) if *expected == password_hash(&req.password) => {
                let token = Uuid::new_v4().to_string();
                self.sessions
                    .write()
                    .map_err(|_| ServiceError::internal("session lock poisoned"))?
                    .insert(token.clone(), req.user);
                Ok(LoginResponse { token })
            }
            _ => Err(ServiceError::unauthenticated("invalid user name or password")),
        }
    }

    fn logout(&self, credential: Option<&str>) -> ServiceResult<()> {
        if let Some(token) = credential {
            self.sessions
                .write()
                .map_err(|_| ServiceError::internal("session lock poisoned"))?
                .remove(token);
        }
        Ok(())
    }

    fn use_database(
        &self,
        database: &str,
        credential: Option<&str>,
    ) -> ServiceResult<UseDatabaseResponse> {
        self.read_ledger(database, |_| Ok(()))?;

        let token = match credential {
            Some(old) => {
                let mut sessions = self
                    .sessions
                    .write()
                    .map_err(|_| ServiceError::internal("session lock poisoned"))?;
                sessions.remove(old).map(|user| {
                    let token = Uuid::new_v4().to_string();
                    sessions.insert(token.clone(), user);
                    token
                })
            }
            None => None,
        };

        Ok(UseDatabaseResponse { token })
    }

    fn signed_root(&self, database: &str) -> ServiceResult<RootResponse> {
        let root = self.current_root(database)?;
        let signature = self.signing_key.as_ref().map(|key| {
            let message = crypto::root_signing_message(database, root.index, &root.hash);
            key.sign(&message).to_bytes().to_vec()
        });
        Ok(RootResponse {
            database: database.to_string(),
            index: root.index,
            hash: root.hash,
            signature,
        })
    }

    fn read_ledger<T>(
        &self,
        database: &str,
        f: impl FnOnce(&Ledger) -> crate::Result<T>,
    ) -> ServiceResult<T> {
        let databases = self
            .databases
            .read()
            .map_err(|_| ServiceError::internal("database lock poisoned"))?;
        let ledger = databases
            .get(database)
            .ok_or_else(|| ServiceError::not_found(format!("database {database} does not exist")))?;
        Ok(f(ledger)?)
    }

    fn write_ledger<T>(
        &self,
        database: &str,
        f: impl FnOnce(&mut Ledger) -> crate::Result<T>,
    ) -> ServiceResult<T> {
        let mut databases = self
            .databases
            .write()
            .map_err(|_| ServiceError::internal("database lock poisoned"))?;
        let ledger = databases
            .get_mut(database)
            .ok_or_else(|| ServiceError::not_found(format!("database {database} does not exist")))?;
        Ok(f(ledger)?)
    }
}

fn password_hash(password: &str) -> Hash32 {
    blake3::hash(password.as_bytes()).into()
}

fn decode_request<T: DeserializeOwned>(bytes: &[u8]) -> ServiceResult<T> {
    wire::decode(bytes).map_err(|e| {
        ServiceError::new(StatusCode::InvalidArgument, format!("malformed request: {e}"))
    })
}

fn respond<T: Serialize>(msg: &T) -> ServiceResult<Vec<u8>> {
    wire::encode(msg).map_err(|e| ServiceError::internal(format!("encode response: {e}")))
}
