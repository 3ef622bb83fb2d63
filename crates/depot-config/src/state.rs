//! Persisted sync state: conditional-request validators per repository and the time of the
//! last successful catalog replacement.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use depot_utils::fs::ensure_dir_exists;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

/// Validators remembered for one repository URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Narrow read/write interface over the conditional-cache map.
pub trait HeaderCache: Send + Sync {
    fn get(&self, url: &str) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry) -> Result<()>;
    fn remove(&self, url: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub last_sync: Option<i64>,
    #[serde(default)]
    pub validators: BTreeMap<String, CacheEntry>,
}

impl SyncState {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn decode(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// [`SyncState`] kept in memory and written through to a JSON file on every change.
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<SyncState>,
}

impl StateStore {
    /// Opens the state file at `path`. A missing file starts empty; an unreadable one is
    /// discarded with a warning since validators can always be re-learned.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) => {
                SyncState::decode(&content).unwrap_or_else(|err| {
                    warn!(path = %path.display(), "discarding corrupt sync state: {err}");
                    SyncState::default()
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => SyncState::default(),
            Err(err) => {
                return Err(ConfigError::IoError {
                    action: format!("read sync state {}", path.display()),
                    source: err,
                })
            }
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    pub fn last_sync(&self) -> Option<i64> {
        self.lock().last_sync
    }

    pub fn set_last_sync(&self, timestamp: i64) -> Result<()> {
        self.update(|state| state.last_sync = Some(timestamp))
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F: FnOnce(&mut SyncState)>(&self, f: F) -> Result<()> {
        let mut state = self.lock();
        f(&mut state);
        self.persist(&state)
    }

    fn persist(&self, state: &SyncState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            ensure_dir_exists(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let io_err = |action: &str, source: std::io::Error| {
            ConfigError::IoError {
                action: format!("{action} {}", tmp_path.display()),
                source,
            }
        };
        fs::write(&tmp_path, state.encode()?).map_err(|err| io_err("write", err))?;
        fs::rename(&tmp_path, path).map_err(|err| io_err("rename", err))?;
        debug!(path = %path.display(), "sync state saved");
        Ok(())
    }
}

impl HeaderCache for StateStore {
    fn get(&self, url: &str) -> Option<CacheEntry> {
        self.lock().validators.get(url).cloned()
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        self.update(|state| {
            state.validators.insert(entry.url.clone(), entry);
        })
    }

    fn remove(&self, url: &str) -> Result<()> {
        self.update(|state| {
            state.validators.remove(url);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|state| state.validators.clear())
    }
}
