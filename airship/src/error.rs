//! Error types for the update engine.
//!
//! Every failure the engine can report to its host maps onto one
//! [`EngineError`] variant. None of them are retried internally; the next
//! sync cycle (or an explicit resume) is the retry.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while checking for, downloading or promoting a bundle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure (connection, timeout, unexpected status, read error).
    #[error("network failure for {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    /// Neither the caller nor the size probe produced a positive bundle size.
    #[error("file size is zero or unknown for {url}")]
    SizeUnknown { url: String },

    /// The destination volume cannot hold the bundle.
    #[error("not enough space to download the file: {available} bytes available, {required} required")]
    InsufficientStorage { available: u64, required: u64 },

    /// The progress fraction could not be computed (corrupt or zero total).
    #[error("invalid progress calculation: {downloaded} of {total} bytes")]
    ProgressComputationError { downloaded: u64, total: u64 },

    /// The stream ended before the expected number of bytes arrived.
    #[error("incomplete file download: received {received} of {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// The downloaded file does not start with the archive magic number.
    #[error("invalid archive: {}", path.display())]
    InvalidArchive { path: PathBuf },

    /// Extraction succeeded but the bundle entry is missing.
    #[error("corrupted bundle: expected entry {} is missing", entry.display())]
    CorruptedBundle { entry: PathBuf },

    /// Local filesystem operation failed.
    #[error("filesystem error at {}: {reason}", path.display())]
    FilesystemError { path: PathBuf, reason: String },

    /// The release-check response could not be decoded.
    #[error("failed to parse release response: {0}")]
    ResponseParseError(String),

    /// A worker panicked; the panic was contained at the task boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable category of an [`EngineError`].
///
/// The string form is the prefix hosts can match on; it never changes
/// between releases even when the human-readable detail does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkFailure,
    SizeUnknown,
    InsufficientStorage,
    ProgressComputationError,
    IncompleteDownload,
    InvalidArchive,
    CorruptedBundle,
    FilesystemError,
    ResponseParseError,
    Internal,
}

impl ErrorKind {
    /// Stable category prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkFailure => "NETWORK_FAILURE",
            Self::SizeUnknown => "SIZE_UNKNOWN",
            Self::InsufficientStorage => "INSUFFICIENT_STORAGE",
            Self::ProgressComputationError => "PROGRESS_COMPUTATION_ERROR",
            Self::IncompleteDownload => "INCOMPLETE_DOWNLOAD",
            Self::InvalidArchive => "INVALID_ARCHIVE",
            Self::CorruptedBundle => "CORRUPTED_BUNDLE",
            Self::FilesystemError => "FILESYSTEM_ERROR",
            Self::ResponseParseError => "RESPONSE_PARSE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::SizeUnknown { .. } => ErrorKind::SizeUnknown,
            Self::InsufficientStorage { .. } => ErrorKind::InsufficientStorage,
            Self::ProgressComputationError { .. } => ErrorKind::ProgressComputationError,
            Self::IncompleteDownload { .. } => ErrorKind::IncompleteDownload,
            Self::InvalidArchive { .. } => ErrorKind::InvalidArchive,
            Self::CorruptedBundle { .. } => ErrorKind::CorruptedBundle,
            Self::FilesystemError { .. } => ErrorKind::FilesystemError,
            Self::ResponseParseError(_) => ErrorKind::ResponseParseError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message carried by a reject signal: stable prefix plus detail.
    pub fn reject_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Wrap an I/O error that occurred at `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FilesystemError {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Build a network failure for `url`.
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
