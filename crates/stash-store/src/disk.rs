use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use stash_types::{Key, Value};
use tracing::{debug, warn};

use crate::codec::{self, JsonSerializer, Serializer};
use crate::error::{StoreError, StoreResult};
use crate::lock::LockedFile;
use crate::traits::Store;

/// File extension of every record the store manages.
pub const EXTENSION: &str = "cache";

/// Disk-backed store: one framed record per key under a root directory.
///
/// Records live at `<root>/<escaped-key>.cache`. Reads hold a shared lock for
/// the duration of the read and writes hold an exclusive lock, so readers in
/// this or any cooperating process never observe a half-written record. The
/// lock does not span a read-modify-write cycle; callers that check, compute,
/// and store may race with other processes and the last write wins.
pub struct DiskStore {
    root: PathBuf,
    serializer: Box<dyn Serializer>,
}

impl DiskStore {
    /// Open a store rooted at `root` using JSON encoding, creating the
    /// directory if it does not exist.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_serializer(root, JsonSerializer)
    }

    /// Open a store rooted at `root` with a custom serializer.
    pub fn with_serializer(
        root: impl Into<PathBuf>,
        serializer: impl Serializer + 'static,
    ) -> StoreResult<Self> {
        let store = Self {
            root: root.into(),
            serializer: Box::new(serializer),
        };
        store.ensure_root()?;
        debug!(root = %store.root.display(), "opened disk store");
        Ok(store)
    }

    /// The directory holding this store's records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `key`.
    pub fn cache_file(&self, key: &Key) -> StoreResult<PathBuf> {
        let stem = key.to_file_stem()?;
        Ok(self.root.join(format!("{stem}.{EXTENSION}")))
    }

    fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Read the raw record for `path`, or `None` if it does not exist.
    fn read_record(path: &Path) -> io::Result<Option<Vec<u8>>> {
        let mut locked = match LockedFile::open_shared(path) {
            Ok(locked) => locked,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut record = Vec::new();
        locked.file().read_to_end(&mut record)?;
        Ok(Some(record))
    }

    fn write_record(path: &Path, record: &[u8]) -> io::Result<()> {
        let mut locked = LockedFile::open_exclusive(path)?;
        let file = locked.file();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(record)?;
        file.sync_all()?;
        Ok(())
    }

    /// Every record file in the root, paired with the key it encodes.
    ///
    /// Files whose names are not canonical key encodings are skipped.
    fn cache_files(&self) -> StoreResult<Vec<(Key, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|name| name.strip_suffix(EXTENSION))
                .and_then(|name| name.strip_suffix('.'))
            else {
                continue;
            };
            match Key::from_file_stem(stem) {
                Ok(key) => files.push((key, entry.path())),
                Err(error) => debug!(%error, "ignoring foreign file in store root"),
            }
        }
        Ok(files)
    }
}

impl Store for DiskStore {
    fn get(&self, key: &Key) -> StoreResult<Option<Value>> {
        let path = self.cache_file(key)?;
        let Some(record) = Self::read_record(&path)? else {
            debug!(%key, "disk store miss");
            return Ok(None);
        };

        let payload = match codec::unframe(&record) {
            Ok(payload) => payload,
            Err(err) => {
                let error = StoreError::corrupt(key, err);
                warn!(%key, %error, "unreadable record; treating as missing");
                return Ok(None);
            }
        };

        match self.serializer.decode(payload) {
            Ok(value) => {
                debug!(%key, len = payload.len(), "disk store hit");
                Ok(Some(value))
            }
            Err(error) => {
                warn!(%key, %error, "undecodable record; treating as missing");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &Key, value: &Value) -> StoreResult<()> {
        let path = self.cache_file(key)?;
        let payload = self.serializer.encode(value)?;
        let record = codec::frame(&payload)?;

        self.ensure_root()?;
        Self::write_record(&path, &record)?;
        debug!(%key, len = payload.len(), "disk store write");
        Ok(())
    }

    fn delete(&self, key: &Key) -> StoreResult<()> {
        let path = self.cache_file(key)?;
        if LockedFile::remove(&path)? {
            debug!(%key, "disk store delete");
        }
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let files = self.cache_files()?;
        let count = files.len();
        for (_, path) in files {
            LockedFile::remove(&path)?;
        }
        debug!(count, root = %self.root.display(), "disk store cleared");
        Ok(())
    }

    fn keys(&self) -> StoreResult<HashSet<Key>> {
        Ok(self
            .cache_files()?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    fn modified(&self, key: &Key) -> StoreResult<Option<SystemTime>> {
        let path = self.cache_file(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskStore")
            .field("root", &self.root)
            .field("serializer", &self.serializer)
            .finish()
    }
}
