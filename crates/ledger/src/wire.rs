//! Request and response messages exchanged between client and server.
//!
//! Bodies are bincode-encoded; the operation name travels next to the body
//! (an HTTP path segment, or a direct argument for in-process transports).

use std::fmt;
use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Hash32, Item, KeyValue, Proof};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Logout,
    CurrentRoot,
    CreateDatabase,
    UseDatabase,
    DatabaseList,
    Get,
    Set,
    SafeGet,
    SafeSet,
    GetBatch,
    SetBatch,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::Login,
        Operation::Logout,
        Operation::CurrentRoot,
        Operation::CreateDatabase,
        Operation::UseDatabase,
        Operation::DatabaseList,
        Operation::Get,
        Operation::Set,
        Operation::SafeGet,
        Operation::SafeSet,
        Operation::GetBatch,
        Operation::SetBatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Logout => "logout",
            Operation::CurrentRoot => "currentRoot",
            Operation::CreateDatabase => "createDatabase",
            Operation::UseDatabase => "useDatabase",
            Operation::DatabaseList => "databaseList",
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::SafeGet => "safeGet",
            Operation::SafeSet => "safeSet",
            Operation::GetBatch => "getBatch",
            Operation::SetBatch => "setBatch",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

/// Outcome class of a failed call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    NotFound,
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    AlreadyExists,
    Internal,
    Unavailable,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::NotFound => "not found",
            StatusCode::Unauthenticated => "unauthenticated",
            StatusCode::PermissionDenied => "permission denied",
            StatusCode::InvalidArgument => "invalid argument",
            StatusCode::AlreadyExists => "already exists",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            StatusCode::NotFound => 404,
            StatusCode::Unauthenticated => 401,
            StatusCode::PermissionDenied => 403,
            StatusCode::InvalidArgument => 400,
            StatusCode::AlreadyExists => 409,
            StatusCode::Internal => 500,
            StatusCode::Unavailable => 503,
        }
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            404 => StatusCode::NotFound,
            401 => StatusCode::Unauthenticated,
            403 => StatusCode::PermissionDenied,
            400 => StatusCode::InvalidArgument,
            409 => StatusCode::AlreadyExists,
            502..=504 => StatusCode::Unavailable,
            _ => StatusCode::Internal,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(msg)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseRequest {
    pub database: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UseDatabaseResponse {
    /// Replacement credential scoped to the new session, if the server
    /// issues credentials
    pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseListResponse {
    pub databases: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub database: String,
    pub index: u64,
    pub hash: Hash32,
    /// ed25519 signature over [`crate::root_signing_message`]
    pub signature: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRequest {
    pub database: String,
    pub key: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub database: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafeGetRequest {
    pub database: String,
    pub key: Vec<u8>,
    /// Size of the root the client already trusts
    pub root_index: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafeSetRequest {
    pub database: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub root_index: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: Item,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub index: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafeItemResponse {
    pub item: Item,
    pub proof: Proof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofResponse {
    pub proof: Proof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetBatchRequest {
    pub database: String,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetBatchRequest {
    pub database: String,
    pub entries: Vec<KeyValue>,
}
