use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs2::FileExt;
use tracing::debug;

/// Number of in-process lock stripes shared by all cache files.
const STRIPES: usize = 256;

static PROCESS_LOCKS: [RwLock<()>; STRIPES] = [const { RwLock::new(()) }; STRIPES];

/// A cache file held under a shared or exclusive lock.
///
/// The lock is released when the value is dropped.
///
/// Advisory file locks coordinate cooperating processes. They are paired with
/// an in-process `RwLock` stripe chosen by path hash so that threads in one
/// process exclude each other regardless of how the platform scopes file
/// locks. Distinct paths may share a stripe, so a thread must not hold two
/// `LockedFile`s at once.
#[derive(Debug)]
pub(crate) struct LockedFile {
    file: File,
    path: PathBuf,
    guard: ProcessGuard,
}

#[derive(Debug)]
enum ProcessGuard {
    Shared(#[allow(dead_code)] RwLockReadGuard<'static, ()>),
    Exclusive(#[allow(dead_code)] RwLockWriteGuard<'static, ()>),
}

impl LockedFile {
    /// Open an existing file for reading under a shared lock.
    ///
    /// Blocks while a writer holds the exclusive lock. Fails with
    /// `io::ErrorKind::NotFound` when the file does not exist.
    pub(crate) fn open_shared(path: &Path) -> io::Result<Self> {
        let guard = process_lock_for_path(path)
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let file = File::open(path)?;
        FileExt::lock_shared(&file)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            guard: ProcessGuard::Shared(guard),
        })
    }

    /// Open (or create) a file for writing under an exclusive lock.
    ///
    /// The file is not truncated on open; callers truncate once the lock is
    /// held so readers never observe an emptied file mid-read. If another
    /// process unlinked or replaced the file while this call waited for the
    /// lock, the stale handle is dropped and the path is opened again, so the
    /// returned handle always refers to the file currently at `path`.
    pub(crate) fn open_exclusive(path: &Path) -> io::Result<Self> {
        let guard = process_lock_for_path(path)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(path)?;
            FileExt::lock_exclusive(&file)?;

            if is_current(&file, path)? {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                    guard: ProcessGuard::Exclusive(guard),
                });
            }
            debug!(path = %path.display(), "locked file was replaced while waiting; reopening");
            let _ = FileExt::unlock(&file);
        }
    }

    /// Remove the file at `path` once no reader or writer holds it.
    ///
    /// Returns `false` when the file did not exist.
    pub(crate) fn remove(path: &Path) -> io::Result<bool> {
        let locked = match Self::open_for_removal(path) {
            Ok(locked) => locked,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let removed = match fs::remove_file(&locked.path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        drop(locked);
        Ok(removed)
    }

    fn open_for_removal(path: &Path) -> io::Result<Self> {
        let guard = process_lock_for_path(path)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        FileExt::lock_exclusive(&file)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            guard: ProcessGuard::Exclusive(guard),
        })
    }

    /// The locked file handle.
    pub(crate) fn file(&mut self) -> &mut File {
        &mut self.file
    }

    /// Whether this handle holds the exclusive lock.
    #[cfg(test)]
    pub(crate) fn is_exclusive(&self) -> bool {
        matches!(self.guard, ProcessGuard::Exclusive(_))
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Whether `file` is still the file linked at `path`.
fn is_current(file: &File, path: &Path) -> io::Result<bool> {
    let linked = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    Ok(same_file(&file.metadata()?, &linked))
}

#[cfg(unix)]
fn same_file(held: &fs::Metadata, linked: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    held.nlink() > 0 && held.dev() == linked.dev() && held.ino() == linked.ino()
}

// Windows refuses to unlink a file with open handles, so a held handle is
// always the linked file.
#[cfg(not(unix))]
fn same_file(_held: &fs::Metadata, _linked: &fs::Metadata) -> bool {
    true
}

fn process_lock_for_path(path: &Path) -> &'static RwLock<()> {
    &PROCESS_LOCKS[stripe_index(path)]
}

fn stripe_index(path: &Path) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % STRIPES as u64) as usize
}
