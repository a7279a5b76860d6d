//! Filesystem primitives used by the download pipeline.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Directory and space queries the engine needs from the platform.
pub trait Filesystem: Send + Sync {
    /// Create `path` and any missing parents.
    fn ensure_dir(&self, path: &Path) -> io::Result<()>;

    /// Bytes available to an unprivileged writer on the volume holding `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;

    /// Delete a file or directory tree, ignoring every error.
    fn delete_silently(&self, path: &Path);
}

/// [`Filesystem`] backed by the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    #[cfg(unix)]
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `c_path` is a valid NUL-terminated string and `stat` is a
        // properly sized, writable statvfs struct.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        #[allow(clippy::unnecessary_cast)]
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }

    fn delete_silently(&self, path: &Path) {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Ignoring delete failure");
            }
        }
    }
}
