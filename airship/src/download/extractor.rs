//! Archive integrity check and extraction.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Local file header signature every zip archive starts with.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Extracts a downloaded archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, destination: &Path) -> EngineResult<()>;
}

/// Zip [`ArchiveExtractor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> EngineResult<()> {
        let file = File::open(archive).map_err(|e| EngineError::filesystem(archive, e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| EngineError::FilesystemError {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        zip.extract(destination)
            .map_err(|e| EngineError::FilesystemError {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// Whether `path` starts with [`ZIP_MAGIC`].
///
/// Files shorter than the signature are not archives.
pub fn has_zip_magic(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(header == ZIP_MAGIC)
}
