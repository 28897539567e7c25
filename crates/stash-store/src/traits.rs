use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use stash_types::{Key, Value};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Key/value persistence contract.
///
/// All implementations must satisfy these invariants:
/// - A store never holds two entries for the same key.
/// - `set` replaces any prior entry wholesale and is durable when it returns.
/// - Readers observe a complete prior write or absence, never a partial one.
/// - The store never interprets the values it holds.
pub trait Store: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key was never written, was deleted, or its
    /// record is torn or corrupt. Returns `Err` on unexpected I/O failure.
    fn get(&self, key: &Key) -> StoreResult<Option<Value>>;

    /// Persist `value` under `key`, replacing any prior entry.
    fn set(&self, key: &Key, value: &Value) -> StoreResult<()>;

    /// Remove the entry for `key`. Absent keys are a no-op.
    fn delete(&self, key: &Key) -> StoreResult<()>;

    /// Remove every entry this store manages.
    fn clear(&self) -> StoreResult<()>;

    /// All persisted keys, read from the backing storage.
    fn keys(&self) -> StoreResult<HashSet<Key>>;

    /// Last-modified time of the entry for `key`, if present.
    fn modified(&self, key: &Key) -> StoreResult<Option<SystemTime>>;

    /// Number of persisted entries.
    fn size(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }

    /// Check whether an entry exists for `key`.
    fn contains(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Read the value stored under `key`, failing with
    /// [`StoreError::NotFound`] when there is none.
    fn load(&self, key: &Key) -> StoreResult<Value> {
        self.get(key)?
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    /// Read several keys at once.
    ///
    /// This is a convenience over per-key `get`: a key that is absent or
    /// fails to read is omitted from the result rather than failing the batch.
    fn get_many(&self, keys: &[Key]) -> BTreeMap<Key, Value> {
        let mut found = BTreeMap::new();
        for key in keys {
            match self.get(key) {
                Ok(Some(value)) => {
                    found.insert(key.clone(), value);
                }
                Ok(None) => debug!(%key, "batch lookup miss"),
                Err(error) => debug!(%key, %error, "batch lookup failed; omitting key"),
            }
        }
        found
    }
}

/// Forward the trait through owning pointers so a store can be boxed for a
/// `Cache` or shared between owners.
macro_rules! forward_store {
    ($($ptr:ident),*) => {$(
        impl<S: Store + ?Sized> Store for $ptr<S> {
            fn get(&self, key: &Key) -> StoreResult<Option<Value>> {
                (**self).get(key)
            }

            fn set(&self, key: &Key, value: &Value) -> StoreResult<()> {
                (**self).set(key, value)
            }

            fn delete(&self, key: &Key) -> StoreResult<()> {
                (**self).delete(key)
            }

            fn clear(&self) -> StoreResult<()> {
                (**self).clear()
            }

            fn keys(&self) -> StoreResult<HashSet<Key>> {
                (**self).keys()
            }

            fn modified(&self, key: &Key) -> StoreResult<Option<SystemTime>> {
                (**self).modified(key)
            }

            fn size(&self) -> StoreResult<usize> {
                (**self).size()
            }

            fn contains(&self, key: &Key) -> StoreResult<bool> {
                (**self).contains(key)
            }
        }
    )*};
}

forward_store!(Box, Arc);
