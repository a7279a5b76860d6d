//! Sync cycles and download triggering.
//!
//! A sync cycle asks the release service for news, applies a rollback the
//! service reports, and decides whether an offered release is downloaded
//! now, deferred until the host mounts, or ignored. Two [`SingleFlight`]
//! guards keep at most one sync cycle and at most one download running;
//! extra requests are dropped, never queued.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::flight::SingleFlight;
use crate::config::EngineConfig;
use crate::download::{DownloadManager, DownloadRequest, DownloadWorker};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink};
use crate::host::{HostLifecycle, PendingRelease};
use crate::release::{
    normalize_release, NormalizedRelease, ReleaseCheckRequest, ReleaseClient, ReleaseOffer,
};
use crate::slot::SlotMachine;

/// Rollback reason used when the release service reports one.
pub const SERVER_ROLLBACK_REASON: &str = "rolled back by release service";

/// How a sync cycle ended.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Nothing new was offered.
    NoUpdate,
    /// The offered release was rolled back before and is ignored.
    Suppressed { release_hash: String },
    /// The host is not mounted; the release was kept for later.
    Deferred(PendingRelease),
    /// A download was started.
    DownloadStarted(JoinHandle<EngineResult<()>>),
    /// Another download is running; the offer was dropped.
    DownloadBusy,
    /// The release check failed. A `SyncError` event was emitted.
    Failed(EngineError),
}

/// Drives sync cycles and the downloads they trigger.
pub struct SyncCoordinator {
    config: EngineConfig,
    release_client: Arc<dyn ReleaseClient>,
    downloads: Arc<DownloadManager>,
    worker: DownloadWorker,
    slots: Arc<SlotMachine>,
    host: Arc<dyn HostLifecycle>,
    events: Arc<dyn EventSink>,
    runtime: Handle,
    sync_flight: Arc<SingleFlight>,
    download_flight: Arc<SingleFlight>,
}

impl SyncCoordinator {
    /// Create a coordinator running its tasks on `runtime`.
    ///
    /// Starts the download worker thread.
    pub fn new(
        config: EngineConfig,
        release_client: Arc<dyn ReleaseClient>,
        downloads: Arc<DownloadManager>,
        slots: Arc<SlotMachine>,
        host: Arc<dyn HostLifecycle>,
        events: Arc<dyn EventSink>,
        runtime: Handle,
    ) -> EngineResult<Self> {
        let worker = DownloadWorker::spawn(Arc::clone(&downloads))?;
        Ok(Self {
            config,
            release_client,
            downloads,
            worker,
            slots,
            host,
            events,
            runtime,
            sync_flight: Arc::new(SingleFlight::new()),
            download_flight: Arc::new(SingleFlight::new()),
        })
    }

    pub fn slots(&self) -> &Arc<SlotMachine> {
        &self.slots
    }

    pub fn host(&self) -> &Arc<dyn HostLifecycle> {
        &self.host
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_flight.is_busy()
    }

    pub fn is_downloading(&self) -> bool {
        self.download_flight.is_busy()
    }

    /// Start a sync cycle in the background.
    ///
    /// Returns `None` without doing anything when a cycle is already
    /// running. Callers that don't care about the outcome may drop the
    /// handle.
    pub fn sync(self: &Arc<Self>) -> Option<JoinHandle<SyncOutcome>> {
        let Some(guard) = self.sync_flight.try_acquire() else {
            debug!("Sync already in progress, ignoring request");
            return None;
        };

        let this = Arc::clone(self);
        let runtime = self.runtime.clone();
        Some(self.runtime.spawn(async move {
            let _guard = guard;
            let cycle = Arc::clone(&this);
            match runtime.spawn(async move { cycle.run_sync().await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Sync task aborted");
                    this.sync_failed(EngineError::Internal(e.to_string()))
                }
            }
        }))
    }

    async fn run_sync(self: Arc<Self>) -> SyncOutcome {
        let request = self.release_request();
        debug!(
            app_version = %request.app_version,
            applied = %request.applied_bundle_hash,
            "Checking for release"
        );

        let client = Arc::clone(&self.release_client);
        let body = match tokio::task::spawn_blocking(move || client.check(&request)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return self.sync_failed(e),
            Err(e) => return self.sync_failed(EngineError::Internal(e.to_string())),
        };

        match normalize_release(&body, &self.config.app_version) {
            Ok(release) => self.apply_release(release),
            Err(e) => self.sync_failed(e),
        }
    }

    fn release_request(&self) -> ReleaseCheckRequest {
        ReleaseCheckRequest {
            app_version: self.config.app_version.clone(),
            platform: self.config.platform.clone(),
            project_id: self.config.project_id.clone(),
            applied_bundle_hash: self.slots.active_release_hash(),
        }
    }

    fn sync_failed(&self, error: EngineError) -> SyncOutcome {
        warn!(error = %error, "Sync failed");
        self.events.emit(EngineEvent::SyncError {
            meta: error.reject_message(),
        });
        SyncOutcome::Failed(error)
    }

    fn apply_release(self: &Arc<Self>, release: NormalizedRelease) -> SyncOutcome {
        if let Some(applied) = &release.applied {
            if applied.is_rolled_back && applied.target_app_version == self.config.app_version {
                info!(version = %applied.target_app_version, "Release service reports a rollback");
                if let Err(e) = self.slots.rollback(false, SERVER_ROLLBACK_REASON) {
                    warn!(error = %e, "Failed to apply reported rollback");
                    self.events.emit(EngineEvent::SyncError {
                        meta: e.reject_message(),
                    });
                }
            }
        }

        match release.offer {
            Some(offer) if offer.update_available && offer.is_usable() => self.handle_offer(offer),
            _ => {
                debug!("No usable release offered");
                SyncOutcome::NoUpdate
            }
        }
    }

    fn handle_offer(self: &Arc<Self>, offer: ReleaseOffer) -> SyncOutcome {
        if self.slots.is_suppressed(&offer.release_hash) {
            warn!(hash = %offer.release_hash, "Offered release was rolled back before, skipping");
            return SyncOutcome::Suppressed {
                release_hash: offer.release_hash,
            };
        }

        if !self.host.is_mounted() {
            let pending = PendingRelease {
                download_url: offer.download_url.clone(),
                release_hash: offer.release_hash.clone(),
                bundle_size: offer.known_size(),
            };
            info!(hash = %pending.release_hash, "Host not mounted, deferring release");
            self.host.set_pending_release(pending.clone());
            return SyncOutcome::Deferred(pending);
        }

        match self.start_download(&offer.release_hash, &offer.download_url, offer.known_size()) {
            Some(handle) => SyncOutcome::DownloadStarted(handle),
            None => SyncOutcome::DownloadBusy,
        }
    }

    /// Download `release_hash` from `url` into the temporary slot.
    ///
    /// Returns `None` when a download is already running. The returned
    /// task resolves after the slot record has been committed and the
    /// completion event emitted.
    pub fn start_download(
        self: &Arc<Self>,
        release_hash: &str,
        url: &str,
        known_size: Option<u64>,
    ) -> Option<JoinHandle<EngineResult<()>>> {
        let Some(guard) = self.download_flight.try_acquire() else {
            debug!(hash = %release_hash, "Download already in progress, ignoring trigger");
            return None;
        };

        let destination = self.config.temp_slot_dir();
        let resume_from = self.downloads.resume_offset(&destination, release_hash);
        let release_hash = release_hash.to_string();
        if resume_from > 0 {
            info!(hash = %release_hash, offset = resume_from, "Resuming download");
            self.events.emit(EngineEvent::DownloadResumed {
                release_hash: release_hash.clone(),
            });
        } else {
            info!(hash = %release_hash, "Starting download");
            self.events.emit(EngineEvent::DownloadStarted {
                release_hash: release_hash.clone(),
            });
        }

        let request = DownloadRequest::new(release_hash.as_str(), url, destination)
            .with_known_size(known_size);
        let this = Arc::clone(self);
        Some(self.runtime.spawn(async move {
            let _guard = guard;
            this.run_download(release_hash, request).await
        }))
    }

    async fn run_download(
        &self,
        release_hash: String,
        request: DownloadRequest,
    ) -> EngineResult<()> {
        let result = self.download_and_stage(&release_hash, request).await;
        match &result {
            Ok(()) => {
                info!(hash = %release_hash, "Download complete");
                self.events.emit(EngineEvent::DownloadComplete { release_hash });
            }
            Err(e) => {
                warn!(hash = %release_hash, error = %e, "Download failed");
                self.events.emit(EngineEvent::DownloadError {
                    release_hash,
                    meta: e.reject_message(),
                });
            }
        }
        result
    }

    async fn download_and_stage(
        &self,
        release_hash: &str,
        request: DownloadRequest,
    ) -> EngineResult<()> {
        let mut task = self.worker.submit(request)?;
        while let Some(progress) = task.progress.recv().await {
            self.events.emit(EngineEvent::DownloadProgress {
                release_hash: release_hash.to_string(),
                progress: progress.fraction,
            });
        }
        task.finish().await?;
        self.slots.on_download_success(release_hash)
    }

    /// The host became ready: mark it mounted and start any deferred
    /// release.
    pub fn on_host_mounted(self: &Arc<Self>) -> Option<JoinHandle<EngineResult<()>>> {
        self.host.set_mounted(true);

        let pending = self.host.take_pending_release()?;
        if self.slots.is_suppressed(&pending.release_hash) {
            warn!(
                hash = %pending.release_hash,
                "Deferred release was rolled back since, dropping it"
            );
            return None;
        }

        let handle = self.start_download(
            &pending.release_hash,
            &pending.download_url,
            pending.bundle_size,
        );
        if handle.is_none() {
            // Keep it for the next mount.
            self.host.set_pending_release(pending);
        }
        handle
    }
}
