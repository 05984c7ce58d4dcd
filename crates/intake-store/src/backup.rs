//! Local backup channel.
//!
//! Every save attempt writes the full payload here before talking to the
//! server. Backups are only read back when a user asks to recover one; they
//! are never merged into the live document on their own.
//!
//! ## Storage key strategy
//!
//! One fixed key per installation (`questionnaire_backup` by default), so a
//! newer snapshot always replaces the previous one. The file store maps the
//! key to `{dir}/{key}.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::BackupError;
use crate::mapping::DocumentPayload;

/// Key the engine writes its snapshot under unless configured otherwise.
pub const DEFAULT_BACKUP_KEY: &str = "questionnaire_backup";

/// A full payload snapshot plus the wall-clock time it was taken.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupEnvelope {
    pub data: DocumentPayload,
    pub timestamp: DateTime<Utc>,
}

impl BackupEnvelope {
    pub fn now(data: DocumentPayload) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Best-effort key-value storage on the client side.
///
/// Calls may block. The save engine runs `put` on tokio's blocking pool.
pub trait BackupStore: Send + Sync {
    fn put(&self, key: &str, envelope: &BackupEnvelope) -> Result<(), BackupError>;

    fn get(&self, key: &str) -> Result<Option<BackupEnvelope>, BackupError>;
}

/// Backup store kept in process memory.
///
/// Snapshots are held serialized, like a browser's local storage would, and
/// an optional byte quota makes writes fail once exceeded.
#[derive(Debug, Default)]
pub struct MemoryBackup {
    entries: DashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any snapshot whose serialized form exceeds `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            quota: Some(bytes),
        }
    }
}

impl BackupStore for MemoryBackup {
    fn put(&self, key: &str, envelope: &BackupEnvelope) -> Result<(), BackupError> {
        let serialized = serde_json::to_string(envelope)?;
        if let Some(quota) = self.quota {
            if serialized.len() > quota {
                return Err(BackupError::Rejected {
                    message: format!("{} bytes exceeds quota of {quota}", serialized.len()),
                });
            }
        }
        self.entries.insert(key.to_string(), serialized);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<BackupEnvelope>, BackupError> {
        match self.entries.get(key) {
            Some(serialized) => Ok(Some(serde_json::from_str(serialized.value())?)),
            None => Ok(None),
        }
    }
}

/// Backup store writing one JSON file per key into a directory.
#[derive(Debug, Clone)]
pub struct FileBackup {
    dir: PathBuf,
}

impl FileBackup {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Build the file path for a key. Path separators are flattened.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl BackupStore for FileBackup {
    fn put(&self, key: &str, envelope: &BackupEnvelope) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| BackupError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec_pretty(envelope)?;
        std::fs::write(&tmp, serialized).map_err(|source| BackupError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| BackupError::Io { path, source })
    }

    fn get(&self, key: &str) -> Result<Option<BackupEnvelope>, BackupError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BackupError::Io { path, source }),
        }
    }
}
