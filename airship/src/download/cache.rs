//! Resumable download offsets.
//!
//! The cache maps a download target to the release being written there and
//! the number of bytes already written for it. It is rewritten after every
//! received chunk, deleted once the download succeeds and left in place on
//! failure so the next attempt can continue where the last one stopped.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Progress of a partially written archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedOffset {
    /// Release the partial archive belongs to.
    pub release_hash: String,
    pub bytes: u64,
}

impl CachedOffset {
    pub fn new(release_hash: impl Into<String>, bytes: u64) -> Self {
        Self {
            release_hash: release_hash.into(),
            bytes,
        }
    }

    /// Bytes recorded for `release_hash`; 0 for any other release.
    pub fn bytes_for(&self, release_hash: &str) -> u64 {
        if self.release_hash == release_hash {
            self.bytes
        } else {
            0
        }
    }
}

/// Durable key-value store of download offsets.
pub trait DownloadCache: Send + Sync {
    /// Entry recorded for `key`.
    fn get(&self, key: &str) -> Option<CachedOffset>;

    /// Record `entry` for `key`, replacing any earlier release.
    fn set(&self, key: &str, entry: CachedOffset) -> EngineResult<()>;

    /// Forget `key`.
    fn delete(&self, key: &str) -> EngineResult<()>;
}

/// Cache key for a download into `destination_dir`.
pub fn cache_key(destination_dir: &Path) -> String {
    destination_dir.to_string_lossy().into_owned()
}

/// [`DownloadCache`] kept in a single JSON file.
///
/// Each write replaces the file through a temp-file rename so a crash
/// leaves either the previous or the new offset, never a torn one.
#[derive(Debug)]
pub struct FileDownloadCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedOffset>>,
}

impl FileDownloadCache {
    /// Open the cache at `path`, loading existing entries.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding unreadable download cache");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, CachedOffset>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::filesystem(parent, e))?;
        }

        let temp_path = self.path.with_extension("tmp");
        let file = File::create(&temp_path).map_err(|e| EngineError::filesystem(&temp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entries).map_err(|e| EngineError::FilesystemError {
            path: temp_path.clone(),
            reason: e.to_string(),
        })?;
        let file = writer
            .into_inner()
            .map_err(|e| EngineError::filesystem(&temp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| EngineError::filesystem(&temp_path, e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| EngineError::filesystem(&self.path, e))
    }
}

impl DownloadCache for FileDownloadCache {
    fn get(&self, key: &str) -> Option<CachedOffset> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, entry: CachedOffset) -> EngineResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), entry);
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> EngineResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }
}

/// In-memory [`DownloadCache`].
#[derive(Debug, Default)]
pub struct MemoryDownloadCache {
    entries: Mutex<HashMap<String, CachedOffset>>,
}

impl MemoryDownloadCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DownloadCache for MemoryDownloadCache {
    fn get(&self, key: &str) -> Option<CachedOffset> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, entry: CachedOffset) -> EngineResult<()> {
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> EngineResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
