use std::env::{self, VarError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stash_store::{DiskStore, InMemoryStore, Store};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Environment variable overriding [`StashConfig::root`].
pub const ENV_ROOT: &str = "STASH_ROOT";
/// Environment variable overriding [`StashConfig::backend`].
pub const ENV_BACKEND: &str = "STASH_BACKEND";
/// Environment variable overriding [`StashConfig::max_age_secs`].
pub const ENV_MAX_AGE_SECS: &str = "STASH_MAX_AGE_SECS";

/// Which [`Store`] implementation backs a cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Disk,
    Memory,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "memory" => Ok(Self::Memory),
            other => Err(CacheError::Config(format!(
                "unknown backend {other:?} (expected \"disk\" or \"memory\")"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk => f.write_str("disk"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Chooses the store directory when none is configured.
pub trait RootProbe {
    fn default_root(&self) -> PathBuf;
}

/// Picks a system-wide default directory for the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostProbe;

impl RootProbe for HostProbe {
    fn default_root(&self) -> PathBuf {
        if cfg!(windows) {
            let drive = env::var("SYSTEMDRIVE").unwrap_or_default();
            PathBuf::from(format!("{drive}\\stash"))
        } else if cfg!(target_os = "macos") {
            PathBuf::from("/var/tmp/stash")
        } else {
            PathBuf::from("/var/lib/stash")
        }
    }
}

/// Stash configuration, usually read from a TOML file:
///
/// ```toml
/// backend = "disk"
/// root = "/var/cache/packages"
/// max_age_secs = 86400
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StashConfig {
    /// Store implementation.
    pub backend: BackendKind,
    /// Directory for the disk backend. Chosen by a [`RootProbe`] when unset.
    pub root: Option<PathBuf>,
    /// Entries older than this many seconds are treated as missing.
    pub max_age_secs: Option<u64>,
}

impl StashConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> CacheResult<Self> {
        toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded stash config");
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Only the `STASH_*` variables are read. One of them holding a value
    /// that is not valid Unicode is a configuration error.
    pub fn apply_env(self) -> CacheResult<Self> {
        let mut vars = Vec::new();
        for name in [ENV_ROOT, ENV_BACKEND, ENV_MAX_AGE_SECS] {
            match env::var(name) {
                Ok(value) => vars.push((name, value)),
                Err(VarError::NotPresent) => {}
                Err(VarError::NotUnicode(raw)) => {
                    return Err(CacheError::Config(format!(
                        "{name} is not valid Unicode: {raw:?}"
                    )))
                }
            }
        }
        self.apply_vars(vars)
    }

    /// Apply overrides from `(name, value)` pairs using the `STASH_*` names.
    /// Unrelated names are ignored.
    pub fn apply_vars<I, K, V>(mut self, vars: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let value = value.as_ref();
            match name.as_ref() {
                ENV_ROOT => self.root = Some(PathBuf::from(value)),
                ENV_BACKEND => self.backend = value.parse()?,
                ENV_MAX_AGE_SECS => {
                    let secs = value.trim().parse::<u64>().map_err(|e| {
                        CacheError::Config(format!("{ENV_MAX_AGE_SECS}={value:?}: {e}"))
                    })?;
                    self.max_age_secs = Some(secs);
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// Entry expiry, if configured.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    /// The configured root, or the probe's default.
    pub fn resolve_root(&self, probe: &dyn RootProbe) -> PathBuf {
        self.root.clone().unwrap_or_else(|| probe.default_root())
    }

    /// Construct the configured store.
    pub fn open_store(&self, probe: &dyn RootProbe) -> CacheResult<Box<dyn Store>> {
        match self.backend {
            BackendKind::Disk => {
                let root = self.resolve_root(probe);
                Ok(Box::new(DiskStore::open(root)?))
            }
            BackendKind::Memory => Ok(Box::new(InMemoryStore::new())),
        }
    }
}
