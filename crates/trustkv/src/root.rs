//! Trusted roots and the stores that hold them

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use ledger::Hash32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A client's trust anchor into one database's log.
///
/// `index` is the number of log entries the root commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    database: String,
    index: u64,
    hash: Hash32,
}

impl Root {
    pub fn new(database: impl Into<String>, index: u64, hash: Hash32) -> Self {
        Self {
            database: database.into(),
            index,
            hash,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn hash(&self) -> &Hash32 {
        &self.hash
    }

    /// Whether `self` may replace `previous` as the trusted root.
    ///
    /// Roots of different databases are never comparable.
    pub fn is_successor_of(&self, previous: Option<&Root>) -> bool {
        match previous {
            None => true,
            Some(prev) => prev.database == self.database && self.index > prev.index,
        }
    }
}

#[derive(Debug, Error)]
pub enum RootStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    Poisoned,
}

/// Persistence for trusted roots, keyed by database.
///
/// Stores are plain persistence: monotonicity is enforced by the client
/// before `put` is called.
pub trait RootStore: Send + Sync {
    fn get(&self, database: &str) -> Result<Option<Root>, RootStoreError>;
    fn put(&self, root: Root) -> Result<(), RootStoreError>;
}

/// In-memory root store (roots are lost when the process exits)
#[derive(Clone, Default)]
pub struct InMemoryRootStore {
    roots: Arc<RwLock<HashMap<String, Root>>>,
}

impl InMemoryRootStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RootStore for InMemoryRootStore {
    fn get(&self, database: &str) -> Result<Option<Root>, RootStoreError> {
        let roots = self.roots.read().map_err(|_| RootStoreError::Poisoned)?;
        Ok(roots.get(database).cloned())
    }

    fn put(&self, root: Root) -> Result<(), RootStoreError> {
        let mut roots = self.roots.write().map_err(|_| RootStoreError::Poisoned)?;
        roots.insert(root.database.clone(), root);
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct RootFile {
    roots: Vec<Root>,
}

/// JSON file backed root store.
///
/// The whole file is rewritten through a temporary sibling and renamed
/// into place, so a crash leaves either the old or the new contents.
pub struct FileRootStore {
    path: PathBuf,
    roots: RwLock<HashMap<String, Root>>,
}

impl FileRootStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RootStoreError> {
        let path = path.as_ref().to_path_buf();
        let roots = match fs::read(&path) {
            Ok(bytes) => {
                let file: RootFile = serde_json::from_slice(&bytes)?;
                file.roots
                    .into_iter()
                    .map(|root| (root.database.clone(), root))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            roots: RwLock::new(roots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, roots: &HashMap<String, Root>) -> Result<(), RootStoreError> {
        let mut file = RootFile {
            roots: roots.values().cloned().collect(),
        };
        file.roots.sort_by(|a, b| a.database.cmp(&b.database));

        let bytes = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RootStore for FileRootStore {
    fn get(&self, database: &str) -> Result<Option<Root>, RootStoreError> {
        let roots = self.roots.read().map_err(|_| RootStoreError::Poisoned)?;
        Ok(roots.get(database).cloned())
    }

    fn put(&self, root: Root) -> Result<(), RootStoreError> {
        let mut roots = self.roots.write().map_err(|_| RootStoreError::Poisoned)?;
        let previous = roots.insert(root.database.clone(), root.clone());
        if let Err(e) = self.persist(&roots) {
            // keep memory and disk in agreement
            match previous {
                Some(prev) => roots.insert(prev.database.clone(), prev),
                None => roots.remove(&root.database),
            };
            return Err(e);
        }
        Ok(())
    }
}
