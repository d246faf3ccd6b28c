//! Sync bookkeeping: when the last sync finished and which category
//! checksums the local cache was built from.
//!
//! Kept apart from the catalog database in a small JSON settings file so a
//! corrupt or missing file only costs a full sync, never cached content.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted sync state.
///
/// `category_checksums` is `None` until a full sync has completed; an empty
/// map means "synced, and the remote had no categories".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBookkeeping {
    pub last_sync: Option<DateTime<Utc>>,
    pub category_checksums: Option<BTreeMap<String, String>>,
}

impl SyncBookkeeping {
    pub fn checksum(&self, category_id: &str) -> Option<&str> {
        self.category_checksums
            .as_ref()
            .and_then(|map| map.get(category_id))
            .map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookkeepingError {
    #[error("Failed to read sync state '{0}': {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Failed to write sync state '{0}': {1}")]
    Write(PathBuf, std::io::Error),
    #[error("Invalid sync state '{0}': {1}")]
    Parse(PathBuf, serde_json::Error),
}

#[async_trait]
pub trait BookkeepingStore: Send + Sync {
    /// Loads the saved state; a store that was never written yields the default.
    async fn load(&self) -> Result<SyncBookkeeping, BookkeepingError>;
    async fn save(&self, state: &SyncBookkeeping) -> Result<(), BookkeepingError>;
}

/// Bookkeeping in a JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileBookkeeping {
    path: PathBuf,
}

impl FileBookkeeping {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl BookkeepingStore for FileBookkeeping {
    async fn load(&self) -> Result<SyncBookkeeping, BookkeepingError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncBookkeeping::default())
            }
            Err(e) => return Err(BookkeepingError::Read(self.path.clone(), e)),
        };
        serde_json::from_str(&contents).map_err(|e| BookkeepingError::Parse(self.path.clone(), e))
    }

    async fn save(&self, state: &SyncBookkeeping) -> Result<(), BookkeepingError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BookkeepingError::Write(self.path.clone(), e))?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| BookkeepingError::Parse(self.path.clone(), e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| BookkeepingError::Write(tmp.clone(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| BookkeepingError::Write(self.path.clone(), e))
    }
}

/// In-process bookkeeping, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryBookkeeping {
    state: Mutex<SyncBookkeeping>,
}

impl MemoryBookkeeping {
    pub fn new(state: SyncBookkeeping) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> SyncBookkeeping {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BookkeepingStore for MemoryBookkeeping {
    async fn load(&self) -> Result<SyncBookkeeping, BookkeepingError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &SyncBookkeeping) -> Result<(), BookkeepingError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }
}
