use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::SystemTime;

use stash_types::{Key, Value};

use crate::error::StoreResult;
use crate::traits::Store;

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    modified: SystemTime,
}

/// In-memory, HashMap-based store.
///
/// Intended for tests and embedding. Entries are held behind a `RwLock` and
/// cloned on read/write. Nothing is persisted.
pub struct InMemoryStore {
    entries: RwLock<HashMap<Key, Entry>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Overwrite the modification time of an entry. Returns `false` if the
    /// key is absent.
    pub fn touch(&self, key: &Key, modified: SystemTime) -> bool {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.get_mut(key) {
            Some(entry) => {
                entry.modified = modified;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for InMemoryStore {
    fn get(&self, key: &Key) -> StoreResult<Option<Value>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &Key, value: &Value) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &Key) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.remove(key);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entries.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn keys(&self) -> StoreResult<HashSet<Key>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    fn modified(&self, key: &Key) -> StoreResult<Option<SystemTime>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).map(|entry| entry.modified))
    }

    fn size(&self) -> StoreResult<usize> {
        Ok(self.len())
    }

    fn contains(&self, key: &Key) -> StoreResult<bool> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryStore")
            .field("entry_count", &count)
            .finish()
    }
}
