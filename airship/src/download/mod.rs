//! Bundle downloads.
//!
//! This module provides:
//! - [`DownloadManager`]: resumable, integrity-checked download of one archive
//! - [`DownloadWorker`]: the serial queue downloads run on
//! - [`DownloadCache`]: durable resume offsets
//! - [`ArchiveExtractor`]: signature check and extraction seam
//! - [`ProgressThrottle`]: progress reporting in 10% steps

pub(crate) mod cache;
pub(crate) mod extractor;
mod manager;
mod progress;
mod worker;

pub use cache::{cache_key, CachedOffset, DownloadCache, FileDownloadCache, MemoryDownloadCache};
pub use extractor::{has_zip_magic, ArchiveExtractor, ZipExtractor, ZIP_MAGIC};
pub use manager::{DownloadManager, DownloadOutcome, DownloadRequest, DownloadSettings, BUFFER_SIZE};
pub use progress::{DownloadProgress, ProgressThrottle, PROGRESS_STEP};
pub use worker::{DownloadTask, DownloadWorker, PROGRESS_CHANNEL_CAPACITY};
