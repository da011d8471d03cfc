//! Storage trait and implementations

use std::collections::HashMap;

use crate::{Item, Result};

/// Entry storage behind a ledger. Entries are only ever appended.
pub trait Storage: Send + Sync {
    fn append(&mut self, item: Item) -> Result<()>;

    /// Most recent entry written under `key`
    fn latest(&self, key: &[u8]) -> Result<Option<Item>>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory storage (for testing and demos)
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    items: Vec<Item>,
    latest: HashMap<Vec<u8>, u64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn append(&mut self, item: Item) -> Result<()> {
        self.latest.insert(item.key.clone(), item.index);
        self.items.push(item);
        Ok(())
    }

    fn latest(&self, key: &[u8]) -> Result<Option<Item>> {
        Ok(self
            .latest
            .get(key)
            .and_then(|index| self.items.get(*index as usize))
            .cloned())
    }

    fn len(&self) -> u64 {
        self.items.len() as u64
    }
}
