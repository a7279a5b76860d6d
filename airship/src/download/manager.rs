//! Resumable, integrity-checked bundle downloads.
//!
//! A download runs these steps, each a precondition for the next:
//!
//! 1. ensure the destination directory exists
//! 2. determine the total size (caller hint, size probe, fallback policy)
//! 3. check free space on the destination volume
//! 4. pick the resume offset from the download cache
//! 5. stream the body, persisting the offset after every chunk
//! 6. report throttled progress
//! 7. verify the byte count
//! 8. verify the archive signature
//! 9. extract and verify the bundle entry
//!
//! The temporary archive is removed on every exit path, including panics.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::{cache_key, CachedOffset, DownloadCache};
use super::extractor::{has_zip_magic, ArchiveExtractor};
use super::progress::{DownloadProgress, ProgressThrottle};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::transport::{Transport, TransportRequest};

/// Buffer size for reading/writing during downloads (64KB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Release the archive belongs to; a partial archive of another
    /// release is never resumed.
    pub release_hash: String,
    pub url: String,
    pub destination_dir: PathBuf,
    /// Size advertised by the release offer, if any.
    pub known_size: Option<u64>,
}

impl DownloadRequest {
    pub fn new(
        release_hash: impl Into<String>,
        url: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            release_hash: release_hash.into(),
            url: url.into(),
            destination_dir: destination_dir.into(),
            known_size: None,
        }
    }

    /// Use `size` as the total when it is positive.
    pub fn with_known_size(mut self, size: Option<u64>) -> Self {
        self.known_size = size.filter(|s| *s > 0);
        self
    }
}

/// Result of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Bytes present in the archive when the stream ended.
    pub downloaded_bytes: u64,
    /// Offset the transfer resumed from (0 for a fresh download).
    pub resumed_from: u64,
    /// Path of the verified bundle entry.
    pub bundle_path: PathBuf,
}

/// Tunables of the download manager.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Name of the temporary archive inside the destination directory.
    pub archive_name: String,
    /// Bundle entry, relative to the destination, required after extraction.
    pub bundle_entry: PathBuf,
    /// Size assumed when no size can be determined.
    pub fallback_size: Option<u64>,
}

impl DownloadSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            archive_name: config.archive_name.clone(),
            bundle_entry: config.bundle_entry.clone(),
            fallback_size: config.fallback_bundle_size,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Removes the temporary archive when dropped.
struct ArchiveCleanup<'a> {
    fs: &'a dyn Filesystem,
    path: PathBuf,
}

impl Drop for ArchiveCleanup<'_> {
    fn drop(&mut self) {
        self.fs.delete_silently(&self.path);
    }
}

/// Downloads, verifies and extracts bundle archives.
pub struct DownloadManager {
    transport: Arc<dyn Transport>,
    fs: Arc<dyn Filesystem>,
    extractor: Arc<dyn ArchiveExtractor>,
    cache: Arc<dyn DownloadCache>,
    settings: DownloadSettings,
}

impl DownloadManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        fs: Arc<dyn Filesystem>,
        extractor: Arc<dyn ArchiveExtractor>,
        cache: Arc<dyn DownloadCache>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            transport,
            fs,
            extractor,
            cache,
            settings,
        }
    }

    /// Path of the temporary archive for `destination_dir`.
    pub fn archive_path(&self, destination_dir: &Path) -> PathBuf {
        destination_dir.join(&self.settings.archive_name)
    }

    /// Offset a download of `release_hash` into `destination_dir` would
    /// resume from.
    ///
    /// Only an offset recorded for the same release counts. It is clamped to
    /// the bytes actually present on disk; writing past the end of a shorter
    /// file would leave a hole.
    pub fn resume_offset(&self, destination_dir: &Path, release_hash: &str) -> u64 {
        let Some(entry) = self.cache.get(&cache_key(destination_dir)) else {
            return 0;
        };
        let cached = entry.bytes_for(release_hash);
        if cached == 0 {
            if entry.bytes > 0 {
                debug!(
                    cached = %entry.release_hash,
                    requested = %release_hash,
                    "Partial archive belongs to another release, starting over"
                );
            }
            return 0;
        }
        let on_disk = std::fs::metadata(self.archive_path(destination_dir))
            .map(|m| m.len())
            .unwrap_or(0);
        cached.min(on_disk)
    }

    /// Run a download to completion.
    ///
    /// `on_progress` is called from the calling thread with throttled,
    /// non-decreasing progress values.
    pub fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> EngineResult<DownloadOutcome> {
        let dest = &request.destination_dir;
        self.fs
            .ensure_dir(dest)
            .map_err(|e| EngineError::filesystem(dest, e))?;

        let archive = self.archive_path(dest);
        let _cleanup = ArchiveCleanup {
            fs: self.fs.as_ref(),
            path: archive.clone(),
        };

        let total = self.determine_size(request)?;

        let available = self
            .fs
            .available_bytes(dest)
            .map_err(|e| EngineError::filesystem(dest, e))?;
        if available < total {
            warn!(available, required = total, "Not enough space for bundle");
            return Err(EngineError::InsufficientStorage {
                available,
                required: total,
            });
        }

        let resume_from = self.resume_offset(dest, &request.release_hash);
        let (resumed_from, downloaded) =
            self.stream_to_file(request, &archive, resume_from, total, on_progress)?;

        if downloaded < total {
            return Err(EngineError::IncompleteDownload {
                received: downloaded,
                expected: total,
            });
        }

        let bundle_path = self.verify_and_extract(&archive, dest)?;

        if let Err(e) = self.cache.delete(&cache_key(dest)) {
            warn!(error = %e, "Failed to clear download cache entry");
        }

        info!(bytes = downloaded, resumed_from, "Bundle downloaded and extracted");
        Ok(DownloadOutcome {
            downloaded_bytes: downloaded,
            resumed_from,
            bundle_path,
        })
    }

    /// Total size from the caller hint, a size probe, or the fallback policy.
    fn determine_size(&self, request: &DownloadRequest) -> EngineResult<u64> {
        if let Some(size) = request.known_size.filter(|s| *s > 0) {
            debug!(size, "Using advertised bundle size");
            return Ok(size);
        }

        let probed = match self.transport.request(&TransportRequest::head(&request.url)) {
            Ok(response) if response.is_success() => response.content_length.unwrap_or(0),
            Ok(response) => {
                debug!(status = response.status, "Size probe rejected");
                0
            }
            Err(e) => {
                debug!(error = %e, "Size probe failed");
                0
            }
        };
        if probed > 0 {
            return Ok(probed);
        }

        match self.settings.fallback_size {
            Some(size) if size > 0 => {
                warn!(size, "Bundle size unknown, using configured fallback");
                Ok(size)
            }
            _ => Err(EngineError::SizeUnknown {
                url: request.url.clone(),
            }),
        }
    }

    /// Stream the body into `archive`.
    ///
    /// Returns the offset the write actually started at and the bytes
    /// present in the archive afterwards.
    fn stream_to_file(
        &self,
        request: &DownloadRequest,
        archive: &Path,
        resume_from: u64,
        total: u64,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> EngineResult<(u64, u64)> {
        let key = cache_key(&request.destination_dir);
        let mut response = self
            .transport
            .request(&TransportRequest::get(&request.url, resume_from))?;

        // 206 Partial Content honours the range; a plain 200 resends everything.
        let start = match response.status {
            206 => resume_from,
            200 => {
                if resume_from > 0 {
                    debug!("Server ignored range request, restarting from zero");
                }
                0
            }
            status => {
                return Err(EngineError::network(
                    &request.url,
                    format!("GET request failed with status {}", status),
                ));
            }
        };

        let mut file = open_at(archive, start)?;
        if start > 0 {
            info!(offset = start, total, "Resuming download");
        }

        let mut throttle = ProgressThrottle::new(total, start);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = start;

        loop {
            let bytes_read = response
                .body
                .read(&mut buffer)
                .map_err(|e| EngineError::network(&request.url, format!("read error: {}", e)))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read])
                .map_err(|e| EngineError::filesystem(archive, e))?;
            downloaded += bytes_read as u64;

            self.cache
                .set(&key, CachedOffset::new(request.release_hash.as_str(), downloaded))?;

            if let Some(progress) = throttle.update(downloaded)? {
                on_progress(progress);
            }
        }

        file.flush().map_err(|e| EngineError::filesystem(archive, e))?;
        file.sync_all()
            .map_err(|e| EngineError::filesystem(archive, e))?;

        Ok((start, downloaded))
    }

    fn verify_and_extract(&self, archive: &Path, dest: &Path) -> EngineResult<PathBuf> {
        let valid = has_zip_magic(archive).map_err(|e| EngineError::filesystem(archive, e))?;
        if !valid {
            return Err(EngineError::InvalidArchive {
                path: archive.to_path_buf(),
            });
        }

        // Stale content must not satisfy the bundle check below.
        if let Some(stale) = self.entry_root(dest).filter(|p| p != archive) {
            self.fs.delete_silently(&stale);
        }

        self.extractor.extract(archive, dest)?;

        let bundle_path = dest.join(&self.settings.bundle_entry);
        if !bundle_path.is_file() {
            return Err(EngineError::CorruptedBundle {
                entry: self.settings.bundle_entry.clone(),
            });
        }
        Ok(bundle_path)
    }

    /// Top-level file or folder of the bundle entry inside `dest`.
    fn entry_root(&self, dest: &Path) -> Option<PathBuf> {
        match self.settings.bundle_entry.components().next()? {
            Component::Normal(name) => Some(dest.join(name)),
            _ => None,
        }
    }
}

/// Open `path` for writing at `offset` without discarding earlier bytes.
///
/// Offset 0 starts a fresh file.
fn open_at(path: &Path, offset: u64) -> EngineResult<File> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(offset == 0)
        .open(path)
        .map_err(|e| EngineError::filesystem(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| EngineError::filesystem(path, e))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::cache::MemoryDownloadCache;
    use crate::download::extractor::tests::zip_bytes;
    use crate::download::extractor::{ZipExtractor, ZIP_MAGIC};
    use crate::fs::LocalFilesystem;
    use crate::transport::tests::{ChunkedBody, MockResponse, MockTransport};
    use crate::transport::Method;
    use parking_lot::Mutex;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    /// Local filesystem reporting a fixed amount of free space.
    struct FixedSpaceFs {
        available: u64,
    }

    impl Filesystem for FixedSpaceFs {
        fn ensure_dir(&self, path: &Path) -> io::Result<()> {
            LocalFilesystem.ensure_dir(path)
        }

        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.available)
        }

        fn delete_silently(&self, path: &Path) {
            LocalFilesystem.delete_silently(path)
        }
    }

    /// Extractor that writes the bundle entry only when told to.
    struct StubExtractor {
        write_bundle: bool,
    }

    impl ArchiveExtractor for StubExtractor {
        fn extract(&self, _archive: &Path, destination: &Path) -> EngineResult<()> {
            if self.write_bundle {
                let entry = destination.join("build/index.bundle");
                fs::create_dir_all(entry.parent().unwrap()).unwrap();
                fs::write(entry, b"bundle").unwrap();
            }
            Ok(())
        }
    }

    /// Extractor that keeps a copy of the archive it was handed.
    #[derive(Default)]
    struct CapturingExtractor {
        archive: Mutex<Vec<u8>>,
    }

    impl ArchiveExtractor for CapturingExtractor {
        fn extract(&self, archive: &Path, destination: &Path) -> EngineResult<()> {
            *self.archive.lock() = fs::read(archive).unwrap();
            StubExtractor { write_bundle: true }.extract(archive, destination)
        }
    }

    struct Fixture {
        _temp: TempDir,
        dest: PathBuf,
        transport: Arc<MockTransport>,
        cache: Arc<MemoryDownloadCache>,
        manager: DownloadManager,
    }

    fn fixture(available: u64, extractor: Arc<dyn ArchiveExtractor>) -> Fixture {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("prod").join("temp");
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryDownloadCache::new());
        let manager = DownloadManager::new(
            transport.clone(),
            Arc::new(FixedSpaceFs { available }),
            extractor,
            cache.clone(),
            DownloadSettings::default(),
        );
        Fixture {
            _temp: temp,
            dest,
            transport,
            cache,
            manager,
        }
    }

    /// Zip magic followed by filler up to `len` bytes.
    fn fake_archive(len: usize) -> Vec<u8> {
        let mut data = vec![0xAB; len];
        data[..4].copy_from_slice(&ZIP_MAGIC);
        data
    }

    fn no_progress() -> impl FnMut(DownloadProgress) {
        |_| {}
    }

    #[test]
    fn test_full_download_with_real_zip() {
        let f = fixture(u64::MAX, Arc::new(ZipExtractor));
        let archive = zip_bytes(&[("build/index.bundle", b"console.log('v2')")]);
        let len = archive.len() as u64;
        f.transport.push_body(200, archive, 1024);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(len));
        let outcome = f.manager.download(&request, &mut no_progress()).unwrap();

        assert_eq!(outcome.downloaded_bytes, len);
        assert_eq!(outcome.resumed_from, 0);
        assert_eq!(fs::read(&outcome.bundle_path).unwrap(), b"console.log('v2')");
        assert!(!f.manager.archive_path(&f.dest).exists());
        assert_eq!(f.cache.get(&cache_key(&f.dest)), None);
    }

    #[test]
    fn test_size_probe_used_when_size_unknown() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push(Ok(MockResponse {
            status: 200,
            content_length: Some(100),
            body: ChunkedBody::new(Vec::new(), 1),
        }));
        f.transport.push_body(200, fake_archive(100), 10);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest);
        f.manager.download(&request, &mut no_progress()).unwrap();

        let requests = f.transport.requests.lock();
        assert_eq!(requests[0].method, Method::Head);
        assert_eq!(requests[1].method, Method::Get);
    }

    #[test]
    fn test_size_unknown_is_rejected() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push(Ok(MockResponse {
            status: 200,
            content_length: None,
            body: ChunkedBody::new(Vec::new(), 1),
        }));

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(0));
        let result = f.manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::SizeUnknown { .. })));
        assert_eq!(f.transport.request_count(), 1);
    }

    #[test]
    fn test_fallback_size_policy() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().to_path_buf();
        let transport = Arc::new(MockTransport::new());
        transport.push(Err(EngineError::network("https://cdn/b.zip", "HEAD refused")));
        transport.push_body(200, fake_archive(50), 10);
        let settings = DownloadSettings {
            fallback_size: Some(50),
            ..DownloadSettings::default()
        };
        let manager = DownloadManager::new(
            transport,
            Arc::new(LocalFilesystem),
            Arc::new(StubExtractor { write_bundle: true }),
            Arc::new(MemoryDownloadCache::new()),
            settings,
        );

        let outcome = manager
            .download(&DownloadRequest::new("R", "https://cdn/b.zip", &dest), &mut no_progress())
            .unwrap();
        assert_eq!(outcome.downloaded_bytes, 50);
    }

    #[test]
    fn test_insufficient_storage_makes_no_transport_call() {
        let f = fixture(5000, Arc::new(StubExtractor { write_bundle: true }));

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(6000));
        let result = f.manager.download(&request, &mut no_progress());

        match result {
            Err(EngineError::InsufficientStorage {
                available,
                required,
            }) => {
                assert_eq!(available, 5000);
                assert_eq!(required, 6000);
            }
            other => panic!("Expected InsufficientStorage, got {:?}", other),
        }
        assert_eq!(f.transport.request_count(), 0);
    }

    #[test]
    fn test_resume_from_cached_offset() {
        let extractor = Arc::new(CapturingExtractor::default());
        let f = fixture(u64::MAX, extractor.clone());
        let full = fake_archive(10_000);

        // A previous process wrote the first 4000 bytes before dying.
        fs::create_dir_all(&f.dest).unwrap();
        fs::write(f.manager.archive_path(&f.dest), &full[..4000]).unwrap();
        f.cache.set(&cache_key(&f.dest), CachedOffset::new("R", 4000)).unwrap();
        assert_eq!(f.manager.resume_offset(&f.dest, "R"), 4000);

        f.transport.push_body(206, full[4000..].to_vec(), 1000);

        let mut written = Vec::new();
        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)
            .with_known_size(Some(10_000));
        let outcome = f
            .manager
            .download(&request, &mut |p: DownloadProgress| written.push(p.downloaded_bytes))
            .unwrap();

        assert_eq!(outcome.resumed_from, 4000);
        assert_eq!(outcome.downloaded_bytes, 10_000);
        let requests = f.transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].range_start, Some(4000));
        // Progress only counts the bytes after the resume point.
        assert!(written.iter().all(|b| *b > 4000));
        // The partial prefix was kept and the tail written after it.
        assert_eq!(*extractor.archive.lock(), full);
    }

    #[test]
    fn test_partial_archive_of_other_release_is_not_resumed() {
        let extractor = Arc::new(CapturingExtractor::default());
        let f = fixture(u64::MAX, extractor.clone());

        // Release A died 4000 bytes in; the service now offers B.
        let mut release_a = vec![0xAA; 10_000];
        release_a[..4].copy_from_slice(&ZIP_MAGIC);
        let mut release_b = vec![0xBB; 10_000];
        release_b[..4].copy_from_slice(&ZIP_MAGIC);
        fs::create_dir_all(&f.dest).unwrap();
        fs::write(f.manager.archive_path(&f.dest), &release_a[..4000]).unwrap();
        f.cache
            .set(&cache_key(&f.dest), CachedOffset::new("A", 4000))
            .unwrap();
        assert_eq!(f.manager.resume_offset(&f.dest, "A"), 4000);
        assert_eq!(f.manager.resume_offset(&f.dest, "B"), 0);

        f.transport.push_body(200, release_b.clone(), 1000);

        let request = DownloadRequest::new("B", "https://cdn/release-B.zip", &f.dest)
            .with_known_size(Some(10_000));
        let outcome = f.manager.download(&request, &mut no_progress()).unwrap();

        assert_eq!(outcome.resumed_from, 0);
        assert_eq!(f.transport.requests.lock()[0].range_start, None);
        assert_eq!(*extractor.archive.lock(), release_b);
        assert_eq!(f.cache.get(&cache_key(&f.dest)), None);
    }

    #[test]
    fn test_interrupted_download_records_its_release() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.cache
            .set(&cache_key(&f.dest), CachedOffset::new("A", 4000))
            .unwrap();
        f.transport.push_body(200, fake_archive(600), 100);

        let request = DownloadRequest::new("B", "https://cdn/b.zip", &f.dest)
            .with_known_size(Some(1000));
        let result = f.manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::IncompleteDownload { .. })));
        assert_eq!(
            f.cache.get(&cache_key(&f.dest)),
            Some(CachedOffset::new("B", 600))
        );
    }

    #[test]
    fn test_interrupted_resume_keeps_cache_offset() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        let full = fake_archive(10_000);
        fs::create_dir_all(&f.dest).unwrap();
        let archive = f.manager.archive_path(&f.dest);
        fs::write(&archive, &full[..4000]).unwrap();
        f.cache.set(&cache_key(&f.dest), CachedOffset::new("R", 4000)).unwrap();

        // Connection drops after 5000 of the remaining 6000 bytes.
        f.transport.push(Ok(MockResponse {
            status: 206,
            content_length: Some(6000),
            body: ChunkedBody::new(full[4000..].to_vec(), 1000).failing_at(5000),
        }));

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(10_000));
        let result = f.manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::NetworkFailure { .. })));
        // 4000 resumed + 5000 streamed before the reset.
        assert_eq!(f.cache.get(&cache_key(&f.dest)), Some(CachedOffset::new("R", 9000)));
        assert!(!archive.exists());
    }

    #[test]
    fn test_server_ignoring_range_restarts_at_zero() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        let full = fake_archive(1000);
        fs::create_dir_all(&f.dest).unwrap();
        fs::write(f.manager.archive_path(&f.dest), vec![0u8; 400]).unwrap();
        f.cache.set(&cache_key(&f.dest), CachedOffset::new("R", 400)).unwrap();

        f.transport.push_body(200, full, 100);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(1000));
        let outcome = f.manager.download(&request, &mut no_progress()).unwrap();
        assert_eq!(outcome.downloaded_bytes, 1000);
        assert_eq!(outcome.resumed_from, 0);
    }

    #[test]
    fn test_stale_cache_offset_clamped_to_file() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.cache.set(&cache_key(&f.dest), CachedOffset::new("R", 4000)).unwrap();
        // No partial archive on disk.
        assert_eq!(f.manager.resume_offset(&f.dest, "R"), 0);
    }

    #[test]
    fn test_progress_is_throttled() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push_body(200, fake_archive(1000), 10);

        let mut reported = Vec::new();
        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)
            .with_known_size(Some(1000));
        f.manager
            .download(&request, &mut |p: DownloadProgress| reported.push(p.fraction))
            .unwrap();

        assert!(!reported.is_empty());
        assert!(reported.len() <= 10);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert!(reported.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_incomplete_download() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push_body(200, fake_archive(600), 100);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(1000));
        let result = f.manager.download(&request, &mut no_progress());

        match result {
            Err(EngineError::IncompleteDownload { received, expected }) => {
                assert_eq!(received, 600);
                assert_eq!(expected, 1000);
            }
            other => panic!("Expected IncompleteDownload, got {:?}", other),
        }
        assert!(!f.manager.archive_path(&f.dest).exists());
        // Kept for the next attempt.
        assert_eq!(f.cache.get(&cache_key(&f.dest)), Some(CachedOffset::new("R", 600)));
    }

    #[test]
    fn test_invalid_archive_is_rejected_and_deleted() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push_body(200, b"<html>not a zip</html>".to_vec(), 8);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(22));
        let result = f.manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::InvalidArchive { .. })));
        assert!(!f.manager.archive_path(&f.dest).exists());
    }

    #[test]
    fn test_missing_bundle_entry_is_corrupted() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: false }));
        // A bundle left by an earlier extraction must not count.
        let stale = f.dest.join("build/index.bundle");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();
        f.transport.push_body(200, fake_archive(100), 10);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(100));
        let result = f.manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::CorruptedBundle { .. })));
        assert!(!stale.exists());
        assert!(!f.manager.archive_path(&f.dest).exists());
    }

    #[test]
    fn test_stale_custom_bundle_entry_is_removed() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("prod").join("temp");
        let transport = Arc::new(MockTransport::new());
        transport.push_body(200, fake_archive(100), 10);
        let settings = DownloadSettings {
            bundle_entry: PathBuf::from("dist/main.jsbundle"),
            ..DownloadSettings::default()
        };
        let manager = DownloadManager::new(
            transport,
            Arc::new(LocalFilesystem),
            Arc::new(StubExtractor { write_bundle: false }),
            Arc::new(MemoryDownloadCache::new()),
            settings,
        );
        let stale = dest.join("dist/main.jsbundle");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &dest)
            .with_known_size(Some(100));
        let result = manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::CorruptedBundle { .. })));
        assert!(!dest.join("dist").exists());
    }

    #[test]
    fn test_top_level_bundle_entry_is_removed() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().to_path_buf();
        let transport = Arc::new(MockTransport::new());
        transport.push_body(200, fake_archive(100), 10);
        let settings = DownloadSettings {
            bundle_entry: PathBuf::from("main.jsbundle"),
            ..DownloadSettings::default()
        };
        let manager = DownloadManager::new(
            transport,
            Arc::new(LocalFilesystem),
            Arc::new(StubExtractor { write_bundle: false }),
            Arc::new(MemoryDownloadCache::new()),
            settings,
        );
        fs::write(dest.join("main.jsbundle"), b"old").unwrap();

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &dest)
            .with_known_size(Some(100));
        let result = manager.download(&request, &mut no_progress());

        assert!(matches!(result, Err(EngineError::CorruptedBundle { .. })));
        assert!(!dest.join("main.jsbundle").exists());
    }

    #[test]
    fn test_http_error_status() {
        let f = fixture(u64::MAX, Arc::new(StubExtractor { write_bundle: true }));
        f.transport.push_body(403, Vec::new(), 1);

        let request = DownloadRequest::new("R", "https://cdn/b.zip", &f.dest)

            .with_known_size(Some(100));
        let result = f.manager.download(&request, &mut no_progress());

        match result {
            Err(EngineError::NetworkFailure { reason, .. }) => assert!(reason.contains("403")),
            other => panic!("Expected NetworkFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_download_request_ignores_zero_size() {
        let request = DownloadRequest::new("R", "u", "/d").with_known_size(Some(0));
        assert_eq!(request.known_size, None);
    }
}
