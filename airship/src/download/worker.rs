//! Dedicated serial download worker.
//!
//! Downloads are blocking I/O, so they run on one OS thread that drains a
//! job queue in order. Work submitted while a download is running waits
//! behind it. Each job hands back a [`DownloadTask`]: a bounded stream of
//! progress values plus the final result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::manager::{DownloadManager, DownloadOutcome, DownloadRequest};
use super::progress::DownloadProgress;
use crate::error::{EngineError, EngineResult};

/// Capacity of the per-download progress channel.
///
/// Throttling caps a download at ten progress values, so this never fills.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 16;

struct DownloadJob {
    request: DownloadRequest,
    progress_tx: mpsc::Sender<DownloadProgress>,
    result_tx: oneshot::Sender<EngineResult<DownloadOutcome>>,
}

/// Handle to one submitted download.
#[derive(Debug)]
pub struct DownloadTask {
    /// Progress values; the stream ends when the download finishes.
    pub progress: mpsc::Receiver<DownloadProgress>,
    result: oneshot::Receiver<EngineResult<DownloadOutcome>>,
}

impl DownloadTask {
    /// Wait for the download's result.
    pub async fn finish(self) -> EngineResult<DownloadOutcome> {
        self.result
            .await
            .unwrap_or_else(|_| {
                Err(EngineError::Internal(
                    "download worker dropped the job".to_string(),
                ))
            })
    }
}

/// Single-threaded download queue.
#[derive(Debug)]
pub struct DownloadWorker {
    jobs: mpsc::UnboundedSender<DownloadJob>,
}

impl DownloadWorker {
    /// Start the worker thread.
    pub fn spawn(manager: Arc<DownloadManager>) -> EngineResult<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<DownloadJob>();

        thread::Builder::new()
            .name("airship-download".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    run_job(&manager, job);
                }
                debug!("Download worker exiting");
            })
            .map_err(|e| EngineError::Internal(format!("failed to spawn download worker: {}", e)))?;

        Ok(Self { jobs })
    }

    /// Queue a download.
    pub fn submit(&self, request: DownloadRequest) -> EngineResult<DownloadTask> {
        let (progress_tx, progress) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let (result_tx, result) = oneshot::channel();

        self.jobs
            .send(DownloadJob {
                request,
                progress_tx,
                result_tx,
            })
            .map_err(|_| EngineError::Internal("download worker is not running".to_string()))?;

        Ok(DownloadTask { progress, result })
    }
}

fn run_job(manager: &DownloadManager, job: DownloadJob) {
    let DownloadJob {
        request,
        progress_tx,
        result_tx,
    } = job;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        manager.download(&request, &mut |progress| {
            // A slow or absent listener must not stall the transfer.
            let _ = progress_tx.try_send(progress);
        })
    }))
    .unwrap_or_else(|payload| {
        let reason = panic_message(payload.as_ref());
        error!(url = %request.url, reason = %reason, "Download worker panicked");
        Err(EngineError::Internal(reason))
    });

    drop(progress_tx);
    let _ = result_tx.send(outcome);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
