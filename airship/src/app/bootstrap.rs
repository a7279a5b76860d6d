//! Engine construction and wiring.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EngineConfig;
use crate::download::{
    ArchiveExtractor, DownloadCache, DownloadManager, DownloadSettings, FileDownloadCache,
    ZipExtractor,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSink, TracingEventSink};
use crate::fs::{Filesystem, LocalFilesystem};
use crate::host::{HostLifecycle, SharedHostState};
use crate::release::{HttpReleaseClient, ReleaseClient};
use crate::slot::{FileSlotStore, SlotMachine, SlotRecord, SlotStore};
use crate::sync::{SyncCoordinator, SyncOutcome};
use crate::transport::{ReqwestTransport, Transport};

/// External collaborators the engine is built from.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub release_client: Arc<dyn ReleaseClient>,
    pub filesystem: Arc<dyn Filesystem>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub download_cache: Arc<dyn DownloadCache>,
    pub slot_store: Arc<dyn SlotStore>,
    pub host: Arc<dyn HostLifecycle>,
    pub events: Arc<dyn EventSink>,
}

impl Collaborators {
    /// Production collaborators: reqwest, zip, local disk, JSON files
    /// under the configured files directory, and log-line events.
    ///
    /// The reqwest clients are blocking; build them outside any async
    /// context.
    pub fn defaults(config: &EngineConfig) -> EngineResult<Self> {
        let transport =
            ReqwestTransport::new(&config.app_token, &config.sdk_token, config.timeout)?;
        let release_client = HttpReleaseClient::new(
            &config.release_check_url,
            &config.app_token,
            &config.sdk_token,
            config.timeout,
        )?;

        Ok(Self {
            transport: Arc::new(transport),
            release_client: Arc::new(release_client),
            filesystem: Arc::new(LocalFilesystem),
            extractor: Arc::new(ZipExtractor),
            download_cache: Arc::new(FileDownloadCache::open(config.download_cache_path())),
            slot_store: Arc::new(FileSlotStore::new(config.slot_record_path())),
            host: Arc::new(SharedHostState::with_persistence(config.pending_release_path())),
            events: Arc::new(TracingEventSink),
        })
    }

    /// Replace the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the host lifecycle signal.
    pub fn with_host(mut self, host: Arc<dyn HostLifecycle>) -> Self {
        self.host = host;
        self
    }
}

/// A wired OTA engine.
///
/// Owns one [`SyncCoordinator`] and, when created with
/// [`start_sync`](Self::start_sync), the Tokio runtime its tasks run on.
/// An engine owning a runtime must be dropped outside async code.
pub struct Engine {
    coordinator: Arc<SyncCoordinator>,

    /// Optional owned runtime (when created via `start_sync()`).
    runtime: Option<Runtime>,
}

impl Engine {
    /// Build an engine whose tasks run on `runtime`.
    pub fn start(
        config: EngineConfig,
        parts: Collaborators,
        runtime: Handle,
    ) -> EngineResult<Self> {
        info!(
            app_version = %config.app_version,
            project = %config.project_id,
            files_dir = %config.files_dir.display(),
            "Starting OTA engine"
        );

        let downloads = Arc::new(DownloadManager::new(
            parts.transport,
            parts.filesystem,
            parts.extractor,
            parts.download_cache,
            DownloadSettings::from_config(&config),
        ));
        let slots = Arc::new(SlotMachine::open(parts.slot_store, Arc::clone(&parts.events))?);
        let coordinator = SyncCoordinator::new(
            config,
            parts.release_client,
            downloads,
            slots,
            parts.host,
            parts.events,
            runtime,
        )?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            runtime: None,
        })
    }

    /// Build an engine that owns a dedicated multi-threaded runtime.
    ///
    /// For callers without an async context, such as CLI commands.
    pub fn start_sync(config: EngineConfig, parts: Collaborators) -> EngineResult<Self> {
        let runtime = Runtime::new().map_err(|e| {
            EngineError::Internal(format!("failed to create Tokio runtime: {}", e))
        })?;
        let mut engine = Self::start(config, parts, runtime.handle().clone())?;
        engine.runtime = Some(runtime);
        Ok(engine)
    }

    /// Run `future` to completion on the owned runtime.
    ///
    /// Returns `None` when the engine was started on a borrowed runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        self.runtime.as_ref().map(|rt| rt.block_on(future))
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// See [`SyncCoordinator::sync`].
    pub fn sync(&self) -> Option<JoinHandle<SyncOutcome>> {
        self.coordinator.sync()
    }

    /// See [`SyncCoordinator::on_host_mounted`].
    pub fn on_host_mounted(&self) -> Option<JoinHandle<EngineResult<()>>> {
        self.coordinator.on_host_mounted()
    }

    pub fn slot_record(&self) -> SlotRecord {
        self.coordinator.slots().snapshot()
    }

    pub fn launch_downloaded(&self) -> EngineResult<Option<String>> {
        self.coordinator.slots().launch_downloaded()
    }

    pub fn stabilize(&self) -> EngineResult<Option<String>> {
        self.coordinator.slots().stabilize()
    }

    pub fn rollback(&self, automatic: bool, reason: &str) -> EngineResult<Option<String>> {
        self.coordinator.slots().rollback(automatic, reason)
    }
}
