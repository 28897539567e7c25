use stash_cache::{Cache, Memoizer};
use stash_merge::FragmentFolder;
use stash_types::{Key, Map, TypeError, Value};
use tracing::debug;

use crate::error::{RashError, RashResult};
use crate::source::FragmentSource;

/// Memoizer slot holding a loader's merged index.
const FETCH: &str = "fetch";

/// The merged repository index: resource key → kind → attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rash {
    entries: Map,
}

impl Rash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: Map) -> Self {
        Self { entries }
    }

    /// Build an index from its `{ key: { kind: attributes } }` object form.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(TypeError::InvalidFragment(
                "repository index must be an object".into(),
            )),
        }
    }

    /// The object form of the index.
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<Key>, value: Value) -> Option<Value> {
        self.entries.insert(key.into().into_string(), value)
    }

    /// Remove `key`, returning its value if present.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.entries.keys().map(Key::from).collect()
    }

    pub fn as_map(&self) -> &Map {
        &self.entries
    }
}

impl From<Rash> for Value {
    fn from(rash: Rash) -> Self {
        rash.into_value()
    }
}

/// Builds a [`Rash`] from a fragment source.
///
/// The source is drained at most once per loader: the first successful
/// [`load`](RashLoader::load) is recorded and handed back to every later
/// call. A failed load records nothing.
#[derive(Debug)]
pub struct RashLoader<S> {
    source: S,
    memo: Memoizer,
}

impl<S: FragmentSource> RashLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            memo: Memoizer::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Whether this loader has already built its index.
    pub fn is_loaded(&self) -> bool {
        self.memo.is_memoized::<Rash>(FETCH)
    }

    /// Drain the source and merge its fragments, once per loader.
    pub fn load(&self) -> RashResult<Rash> {
        self.memo.get_or_try_compute(FETCH, || self.fetch())
    }

    /// Return the index cached under `key`, loading and caching it on a miss.
    ///
    /// If the source fails nothing is written to `cache`.
    pub fn load_cached(&self, cache: &Cache, key: impl Into<Key>) -> RashResult<Rash> {
        let value = cache.try_compute_or_fetch(key, || self.load().map(Rash::into_value))?;
        Ok(Rash::from_value(value)?)
    }

    fn fetch(&self) -> RashResult<Rash> {
        let mut folder = FragmentFolder::new();
        for fragment in self.source.fragments() {
            folder.fold(fragment.map_err(RashError::Source)?);
        }
        debug!(fragments = folder.folded(), "repository index built");
        Ok(Rash::from_map(folder.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResourceRecord;
    use crate::source::{FnSource, SourceError};
    use serde_json::json;
    use stash_store::{DiskStore, InMemoryStore};
    use stash_types::Fragment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn av_fragments() -> Vec<Fragment> {
        vec![
            Fragment::single("av", "ini", json!({"name": "AV.ini", "size": "0.0 MB"})),
            Fragment::single("av", "zip", json!({"name": "AV.zip", "size": "32.6 MB"})),
        ]
    }

    fn av_expected() -> Value {
        json!({
            "ini": {"name": "AV.ini", "size": "0.0 MB"},
            "zip": {"name": "AV.zip", "size": "32.6 MB"}
        })
    }

    // -----------------------------------------------------------------------
    // Rash
    // -----------------------------------------------------------------------

    #[test]
    fn index_operations() {
        let mut rash = Rash::new();
        assert!(rash.is_empty());

        assert_eq!(rash.set("av", json!({"ini": {}})), None);
        assert_eq!(rash.set("bv", json!({"zip": {}})), None);
        assert_eq!(rash.size(), 2);
        assert!(rash.contains("av"));
        assert_eq!(rash.keys(), vec![Key::from("av"), Key::from("bv")]);

        let replaced = rash.set("av", json!({"zip": {}}));
        assert_eq!(replaced, Some(json!({"ini": {}})));

        assert_eq!(rash.delete("av"), Some(json!({"zip": {}})));
        assert_eq!(rash.delete("av"), None);
        assert_eq!(rash.size(), 1);
    }

    #[test]
    fn value_form() {
        let rash = Rash::from_value(json!({"av": {"ini": {}}})).unwrap();
        assert_eq!(rash.to_value(), json!({"av": {"ini": {}}}));
        assert!(Rash::from_value(json!([1])).is_err());
    }

    // -----------------------------------------------------------------------
    // Loader
    // -----------------------------------------------------------------------

    #[test]
    fn merges_fragments_sharing_a_root() {
        let loader = RashLoader::new(av_fragments());
        let rash = loader.load().unwrap();
        assert_eq!(rash.size(), 1);
        assert_eq!(rash.get("av"), Some(&av_expected()));
    }

    #[test]
    fn source_is_drained_once_per_loader() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);
        let loader = RashLoader::new(FnSource(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            av_fragments().into_iter().map(Ok::<_, SourceError>)
        }));

        assert!(!loader.is_loaded());
        let first = loader.load().unwrap();
        let second = loader.load().unwrap();
        assert_eq!(first, second);
        assert!(loader.is_loaded());
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_error_aborts_load() {
        let loader = RashLoader::new(FnSource(|| {
            vec![
                Ok(Fragment::single("av", "ini", json!({}))),
                Err(SourceError::from("crawl interrupted")),
            ]
        }));
        let err = loader.load().unwrap_err();
        assert!(matches!(err, RashError::Source(_)));
        assert!(!loader.is_loaded());
    }

    #[test]
    fn loads_from_resource_records() {
        let records: Vec<ResourceRecord> = [
            "http://repo.example/packages/AV/AV.ini",
            "http://repo.example/packages/AV/AV.zip",
            "http://repo.example/packages/BV/BV.zip",
        ]
        .into_iter()
        .map(|url| ResourceRecord::from_url(url).unwrap())
        .collect();

        let rash = RashLoader::new(records).load().unwrap();
        assert_eq!(rash.keys(), vec![Key::from("av"), Key::from("bv")]);
        let av = rash.get("av").unwrap();
        assert_eq!(av["ini"]["name"], json!("AV.ini"));
        assert_eq!(av["zip"]["name"], json!("AV.zip"));
    }

    // -----------------------------------------------------------------------
    // Caching
    // -----------------------------------------------------------------------

    #[test]
    fn merged_entry_cached_and_fetched_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(DiskStore::open(dir.path()).unwrap());

        let rash = RashLoader::new(av_fragments()).load().unwrap();
        let av = rash.get("av").cloned().unwrap();
        cache.compute_or_fetch("av", || av).unwrap();

        assert_eq!(cache.fetch("av").unwrap(), av_expected());
    }

    #[test]
    fn load_cached_skips_the_source_on_later_runs() {
        let dir = tempfile::tempdir().unwrap();
        let passes = Arc::new(AtomicUsize::new(0));
        let make_loader = || {
            let counter = Arc::clone(&passes);
            RashLoader::new(FnSource(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                av_fragments().into_iter().map(Ok::<_, SourceError>)
            }))
        };

        for _ in 0..3 {
            let cache = Cache::new(DiskStore::open(dir.path()).unwrap());
            let rash = make_loader().load_cached(&cache, "packages").unwrap();
            assert_eq!(rash.get("av"), Some(&av_expected()));
        }
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_caches_nothing() {
        let cache = Cache::new(InMemoryStore::new());
        let loader = RashLoader::new(FnSource(|| {
            vec![Err::<Fragment, _>(SourceError::from("host unreachable"))]
        }));
        assert!(loader.load_cached(&cache, "packages").is_err());
        assert!(!cache.contains("packages").unwrap());
    }
}
