//! Host lifecycle signal and deferred releases.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A release deferred because the host was not mounted when it was offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRelease {
    pub download_url: String,
    pub release_hash: String,
    /// Size advertised by the release offer, if any.
    #[serde(default)]
    pub bundle_size: Option<u64>,
}

/// View of the embedding application's lifecycle.
pub trait HostLifecycle: Send + Sync {
    /// Whether the host application is currently mounted / foregrounded.
    fn is_mounted(&self) -> bool;

    /// Record the mounted state.
    fn set_mounted(&self, mounted: bool);

    /// Persist a deferred release, replacing any earlier one.
    fn set_pending_release(&self, release: PendingRelease);

    /// Current deferred release, if any.
    fn pending_release(&self) -> Option<PendingRelease>;

    /// Remove and return the deferred release.
    fn take_pending_release(&self) -> Option<PendingRelease>;
}

/// In-process host state, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct SharedHostState {
    mounted: AtomicBool,
    pending: Mutex<Option<PendingRelease>>,
    persist_path: Option<PathBuf>,
}

impl SharedHostState {
    /// Create an unmounted host state with no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create host state whose pending release survives restarts.
    ///
    /// A pending release left in `path` by an earlier process is loaded.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let pending = load_pending(&path);
        Self {
            mounted: AtomicBool::new(false),
            pending: Mutex::new(pending),
            persist_path: Some(path),
        }
    }

    /// Start in the given mounted state.
    pub fn mounted(self, mounted: bool) -> Self {
        self.mounted.store(mounted, Ordering::SeqCst);
        self
    }

    fn persist(&self, release: Option<&PendingRelease>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let result = match release {
            Some(release) => serde_json::to_vec_pretty(release)
                .map_err(std::io::Error::other)
                .and_then(|bytes| {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, bytes)
                }),
            None => match fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to persist pending release");
        }
    }
}

fn load_pending(path: &Path) -> Option<PendingRelease> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(release) => Some(release),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable pending release");
            None
        }
    }
}

impl HostLifecycle for SharedHostState {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
    }

    fn set_pending_release(&self, release: PendingRelease) {
        let mut pending = self.pending.lock();
        self.persist(Some(&release));
        *pending = Some(release);
    }

    fn pending_release(&self) -> Option<PendingRelease> {
        self.pending.lock().clone()
    }

    fn take_pending_release(&self) -> Option<PendingRelease> {
        let mut pending = self.pending.lock();
        let taken = pending.take();
        if taken.is_some() {
            self.persist(None);
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn release(hash: &str) -> PendingRelease {
        PendingRelease {
            download_url: format!("https://cdn.example.com/{}.zip", hash),
            release_hash: hash.to_string(),
            bundle_size: Some(1024),
        }
    }

    #[test]
    fn test_mounted_flag() {
        let host = SharedHostState::new();
        assert!(!host.is_mounted());
        host.set_mounted(true);
        assert!(host.is_mounted());
        assert!(SharedHostState::new().mounted(true).is_mounted());
    }

    #[test]
    fn test_pending_release_is_cleared_once_taken() {
        let host = SharedHostState::new();
        host.set_pending_release(release("a"));
        host.set_pending_release(release("b"));
        assert_eq!(host.pending_release().unwrap().release_hash, "b");
        assert_eq!(host.take_pending_release().unwrap().release_hash, "b");
        assert!(host.take_pending_release().is_none());
    }

    #[test]
    fn test_pending_release_survives_restart() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pending_release.json");

        let host = SharedHostState::with_persistence(&path);
        host.set_pending_release(release("abc"));
        drop(host);

        let reloaded = SharedHostState::with_persistence(&path);
        assert_eq!(reloaded.pending_release(), Some(release("abc")));

        reloaded.take_pending_release();
        assert!(!path.exists());
        assert!(SharedHostState::with_persistence(&path)
            .pending_release()
            .is_none());
    }
}
