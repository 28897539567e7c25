use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_store::Store;
use stash_types::{Key, Value};
use tracing::debug;

use crate::config::{RootProbe, StashConfig};
use crate::error::{CacheError, CacheResult};

/// Fetch-or-compute facade over a [`Store`].
///
/// Every operation takes a key; use [`operation_key!`](crate::operation_key)
/// to key an entry by the name of the calling function.
///
/// `compute_or_fetch` checks and then writes without holding a lock across the
/// two steps. Two processes racing on the same missing key may both compute
/// and both write; the later write wins. Cached computations are expected to
/// be idempotent, so either result is acceptable.
pub struct Cache {
    store: Box<dyn Store>,
    max_age: Option<Duration>,
}

impl Cache {
    /// Create a cache over `store` with no expiry.
    pub fn new(store: impl Store + 'static) -> Self {
        Self::from_boxed(Box::new(store))
    }

    /// Create a cache over an already boxed store.
    pub fn from_boxed(store: Box<dyn Store>) -> Self {
        Self {
            store,
            max_age: None,
        }
    }

    /// Create a cache from configuration, opening the configured store.
    pub fn from_config(config: &StashConfig, probe: &dyn RootProbe) -> CacheResult<Self> {
        let cache = Self::from_boxed(config.open_store(probe)?);
        Ok(match config.max_age() {
            Some(max_age) => cache.with_max_age(max_age),
            None => cache,
        })
    }

    /// Treat entries last written more than `max_age` ago as missing.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Return the cached value for `key`.
    ///
    /// Fails with [`CacheError::KeyNotCached`] if there is no fresh entry.
    pub fn fetch(&self, key: impl Into<Key>) -> CacheResult<Value> {
        let key = key.into();
        match self.lookup(&key)? {
            Some(value) => Ok(value),
            None => Err(CacheError::KeyNotCached(key)),
        }
    }

    /// Return the cached value for `key`, deserialized into `T`.
    pub fn fetch_as<T: DeserializeOwned>(&self, key: impl Into<Key>) -> CacheResult<T> {
        let key = key.into();
        let value = self.fetch(&key)?;
        decode(&key, value)
    }

    /// Return the cached value for `key`, or run `producer`, store its
    /// result, and return it.
    ///
    /// `producer` runs only when the key is missing at the time of the check.
    pub fn compute_or_fetch<F>(&self, key: impl Into<Key>, producer: F) -> CacheResult<Value>
    where
        F: FnOnce() -> Value,
    {
        self.try_compute_or_fetch(key, || Ok::<_, CacheError>(producer()))
    }

    /// Fallible variant of [`Cache::compute_or_fetch`]. If `producer` fails
    /// nothing is stored and its error is returned.
    pub fn try_compute_or_fetch<E, F>(&self, key: impl Into<Key>, producer: F) -> Result<Value, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Result<Value, E>,
    {
        let key = key.into();
        if let Some(value) = self.lookup(&key)? {
            debug!(%key, "cache hit");
            return Ok(value);
        }

        debug!(%key, "cache miss; computing");
        let value = producer()?;
        self.store.set(&key, &value).map_err(CacheError::from)?;
        Ok(value)
    }

    /// Typed variant of [`Cache::compute_or_fetch`].
    pub fn cached<T, F>(&self, key: impl Into<Key>, producer: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = key.into();
        if let Some(value) = self.lookup(&key)? {
            debug!(%key, "cache hit");
            return decode(&key, value);
        }

        debug!(%key, "cache miss; computing");
        let computed = producer();
        let value = serde_json::to_value(&computed).map_err(|e| CacheError::Encode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.set(&key, &value)?;
        Ok(computed)
    }

    /// Whether a fresh entry exists for `key`.
    pub fn contains(&self, key: impl Into<Key>) -> CacheResult<bool> {
        let key = key.into();
        if self.is_expired(&key)? {
            return Ok(false);
        }
        Ok(self.store.contains(&key)?)
    }

    /// Remove every entry.
    pub fn clear_all(&self) -> CacheResult<()> {
        self.store.clear()?;
        debug!("cache cleared");
        Ok(())
    }

    /// Remove the entry for `key`, if any.
    pub fn clear_key(&self, key: impl Into<Key>) -> CacheResult<()> {
        let key = key.into();
        self.store.delete(&key)?;
        debug!(%key, "cache entry cleared");
        Ok(())
    }

    /// Number of stored entries, expired ones included.
    pub fn size(&self) -> CacheResult<usize> {
        Ok(self.store.size()?)
    }

    /// All stored keys in sorted order, expired ones included.
    pub fn keys(&self) -> CacheResult<BTreeSet<Key>> {
        Ok(self.store.keys()?.into_iter().collect())
    }

    /// When the entry for `key` was last written.
    pub fn modified(&self, key: impl Into<Key>) -> CacheResult<Option<SystemTime>> {
        Ok(self.store.modified(&key.into())?)
    }

    fn lookup(&self, key: &Key) -> CacheResult<Option<Value>> {
        if self.is_expired(key)? {
            debug!(%key, "cache entry expired");
            return Ok(None);
        }
        Ok(self.store.get(key)?)
    }

    fn is_expired(&self, key: &Key) -> CacheResult<bool> {
        let Some(max_age) = self.max_age else {
            return Ok(false);
        };
        let Some(modified) = self.store.modified(key)? else {
            return Ok(false);
        };
        // A modification time in the future counts as fresh.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        Ok(age > max_age)
    }
}

fn decode<T: DeserializeOwned>(key: &Key, value: Value) -> CacheResult<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Decode {
        key: key.clone(),
        reason: e.to_string(),
    })
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::operation_key;
    use serde::Deserialize;
    use serde_json::json;
    use stash_store::{DiskStore, InMemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn memory_cache() -> Cache {
        Cache::new(InMemoryStore::new())
    }

    fn disk_cache() -> (tempfile::TempDir, Cache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(DiskStore::open(dir.path()).unwrap());
        (dir, cache)
    }

    // -----------------------------------------------------------------------
    // Fetch
    // -----------------------------------------------------------------------

    #[test]
    fn fetch_missing_key_is_not_cached() {
        let cache = memory_cache();
        let err = cache.fetch("absent").unwrap_err();
        assert!(matches!(err, CacheError::KeyNotCached(k) if k == Key::from("absent")));
    }

    #[test]
    fn fetch_returns_stored_value() {
        let (_dir, cache) = disk_cache();
        cache.compute_or_fetch("k", || json!({"a": [1, 2]})).unwrap();
        assert_eq!(cache.fetch("k").unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn fetch_as_decodes() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Entry {
            name: String,
        }

        let cache = memory_cache();
        cache.compute_or_fetch("e", || json!({"name": "AV.ini"})).unwrap();
        let entry: Entry = cache.fetch_as("e").unwrap();
        assert_eq!(entry.name, "AV.ini");

        let err = cache.fetch_as::<Vec<u8>>("e").unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    // -----------------------------------------------------------------------
    // Compute-or-fetch
    // -----------------------------------------------------------------------

    #[test]
    fn producer_runs_once_across_calls() {
        let (_dir, cache) = disk_cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..5 {
            let value = cache
                .compute_or_fetch("index", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    json!({"av": {"ini": {}}})
                })
                .unwrap();
            assert_eq!(value, json!({"av": {"ini": {}}}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entry_survives_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = Cache::new(DiskStore::open(dir.path()).unwrap());
            cache.compute_or_fetch("persisted", || json!(42)).unwrap();
        }
        let cache = Cache::new(DiskStore::open(dir.path()).unwrap());
        let value = cache
            .compute_or_fetch("persisted", || panic!("must not recompute"))
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn failed_producer_stores_nothing() {
        let cache = memory_cache();
        let result: Result<Value, CacheError> = cache.try_compute_or_fetch("k", || {
            Err(CacheError::Config("crawler unavailable".into()))
        });
        assert!(result.is_err());
        assert!(!cache.contains("k").unwrap());
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn typed_cached_roundtrip() {
        let cache = memory_cache();
        let calls = AtomicUsize::new(0);
        let produce = || {
            calls.fetch_add(1, Ordering::SeqCst);
            vec![String::from("av"), String::from("bv")]
        };
        let first: Vec<String> = cache.cached("names", produce).unwrap();
        let second: Vec<String> = cache.cached("names", produce).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn package_index(cache: &Cache, calls: &AtomicUsize) -> Value {
        cache
            .compute_or_fetch(operation_key!(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                json!(["av", "bv"])
            })
            .unwrap()
    }

    #[test]
    fn call_site_key_names_the_operation() {
        let cache = memory_cache();
        let calls = AtomicUsize::new(0);
        package_index(&cache, &calls);
        package_index(&cache, &calls);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("package_index").unwrap());
        assert_eq!(cache.fetch("package_index").unwrap(), json!(["av", "bv"]));
    }

    // -----------------------------------------------------------------------
    // Clear / Size
    // -----------------------------------------------------------------------

    #[test]
    fn clear_key_decrements_size_by_one() {
        let (_dir, cache) = disk_cache();
        cache.compute_or_fetch("a", || json!(1)).unwrap();
        cache.compute_or_fetch("b", || json!(2)).unwrap();
        assert_eq!(cache.size().unwrap(), 2);

        cache.clear_key("a").unwrap();
        assert!(!cache.contains("a").unwrap());
        assert_eq!(cache.size().unwrap(), 1);

        cache.clear_key("a").unwrap();
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn clear_all_empties() {
        let (_dir, cache) = disk_cache();
        for name in ["a", "b", "c"] {
            cache.compute_or_fetch(name, || json!(name)).unwrap();
        }
        cache.clear_all().unwrap();
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.keys().unwrap().is_empty());
    }

    #[test]
    fn keys_are_sorted() {
        let cache = memory_cache();
        for name in ["zip", "av", "ini"] {
            cache.compute_or_fetch(name, || json!(null)).unwrap();
        }
        let keys: Vec<String> = cache.keys().unwrap().into_iter().map(Key::into_string).collect();
        assert_eq!(keys, vec!["av", "ini", "zip"]);
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    #[test]
    fn stale_entries_are_recomputed() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Cache::new(Arc::clone(&store)).with_max_age(Duration::from_secs(60));
        cache.compute_or_fetch("k", || json!("old")).unwrap();
        assert!(cache.contains("k").unwrap());

        store.touch(&Key::from("k"), SystemTime::now() - Duration::from_secs(120));
        assert!(!cache.contains("k").unwrap());
        assert!(matches!(cache.fetch("k"), Err(CacheError::KeyNotCached(_))));

        let value = cache.compute_or_fetch("k", || json!("new")).unwrap();
        assert_eq!(value, json!("new"));
        assert_eq!(cache.fetch("k").unwrap(), json!("new"));
    }

    #[test]
    fn without_max_age_entries_never_expire() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Cache::new(Arc::clone(&store));
        cache.compute_or_fetch("k", || json!(1)).unwrap();
        store.touch(&Key::from("k"), SystemTime::UNIX_EPOCH);
        assert_eq!(cache.fetch("k").unwrap(), json!(1));
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    #[test]
    fn from_config_applies_backend_and_expiry() {
        let config = StashConfig {
            backend: BackendKind::Memory,
            root: None,
            max_age_secs: Some(30),
        };
        let cache = Cache::from_config(&config, &crate::config::HostProbe).unwrap();
        assert_eq!(cache.max_age(), Some(Duration::from_secs(30)));
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn from_config_disk_uses_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = StashConfig {
            root: Some(dir.path().join("cache")),
            ..Default::default()
        };
        let cache = Cache::from_config(&config, &crate::config::HostProbe).unwrap();
        cache.compute_or_fetch("av", || json!(1)).unwrap();
        assert!(dir.path().join("cache").join("av.cache").is_file());
    }
}
