//! Persistence of the slot record.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use super::record::SlotRecord;
use crate::error::{EngineError, EngineResult};

/// Durable storage for the [`SlotRecord`].
///
/// `save` is the commit point of every slot transition: once it returns
/// `Ok` the record survives a crash, and a failed save leaves the
/// previously stored record in place.
pub trait SlotStore: Send + Sync {
    /// The stored record, or the default record on first launch.
    fn load(&self) -> EngineResult<SlotRecord>;

    fn save(&self, record: &SlotRecord) -> EngineResult<()>;
}

/// [`SlotStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    path: PathBuf,
}

impl FileSlotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotStore for FileSlotStore {
    fn load(&self) -> EngineResult<SlotRecord> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SlotRecord::default()),
            Err(e) => return Err(EngineError::filesystem(&self.path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Slot record is unreadable");
            EngineError::FilesystemError {
                path: self.path.clone(),
                reason: format!("invalid slot record: {}", e),
            }
        })
    }

    fn save(&self, record: &SlotRecord) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::filesystem(parent, e))?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let file = File::create(&temp_path).map_err(|e| EngineError::filesystem(&temp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record).map_err(|e| EngineError::FilesystemError {
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

/// In-memory [`SlotStore`].
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    record: Mutex<SlotRecord>,
    fail_saves: Mutex<bool>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `record` instead of the default.
    pub fn with_record(record: SlotRecord) -> Self {
        Self {
            record: Mutex::new(record),
            fail_saves: Mutex::new(false),
        }
    }

    /// Make every following save fail, simulating a broken disk.
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    /// Last committed record.
    pub fn stored(&self) -> SlotRecord {
        self.record.lock().clone()
    }
}

impl SlotStore for MemorySlotStore {
    fn load(&self) -> EngineResult<SlotRecord> {
        Ok(self.stored())
    }

    fn save(&self, record: &SlotRecord) -> EngineResult<()> {
        if *self.fail_saves.lock() {
            return Err(EngineError::FilesystemError {
                path: PathBuf::from("<memory>"),
                reason: "save disabled".to_string(),
            });
        }
        *self.record.lock() = record.clone();
        Ok(())
    }
}
