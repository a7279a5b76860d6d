//! Event notifications surfaced to the embedding application.
//!
//! The engine never talks to the host directly; it emits [`EngineEvent`]s
//! into an [`EventSink`]. Sinks are invoked from whichever worker produced
//! the event (sync task or download worker), never marshalled onto the
//! host's primary context.

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// An event emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The release check failed.
    SyncError { meta: String },
    /// A fresh download began.
    DownloadStarted { release_hash: String },
    /// A download resumed from a cached offset.
    DownloadResumed { release_hash: String },
    /// Throttled download progress.
    DownloadProgress { release_hash: String, progress: f64 },
    /// The bundle was downloaded, verified and staged.
    DownloadComplete { release_hash: String },
    /// The download was rejected.
    DownloadError { release_hash: String, meta: String },
    /// The active build was rolled back.
    RolledBack {
        release_hash: String,
        automatic: bool,
        meta: String,
    },
    /// A NEW build was promoted to CURRENT.
    Stabilized { release_hash: String },
}

impl EngineEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SyncError { .. } => "SYNC_ERROR_PROD",
            Self::DownloadStarted { .. } => "DOWNLOAD_STARTED_PROD",
            Self::DownloadResumed { .. } => "DOWNLOAD_RESUME_PROD",
            Self::DownloadProgress { .. } => "DOWNLOAD_PROGRESS_PROD",
            Self::DownloadComplete { .. } => "DOWNLOAD_COMPLETE_PROD",
            Self::DownloadError { .. } => "DOWNLOAD_ERROR_PROD",
            Self::RolledBack {
                automatic: true, ..
            } => "AUTO_ROLLED_BACK_PROD",
            Self::RolledBack { .. } => "ROLLED_BACK_PROD",
            Self::Stabilized { .. } => "STABILIZED_PROD",
        }
    }

    /// Payload mapping delivered alongside the event type.
    pub fn payload(&self) -> Map<String, Value> {
        let value = match self {
            Self::SyncError { meta } => json!({ "meta": meta }),
            Self::DownloadStarted { release_hash }
            | Self::DownloadResumed { release_hash }
            | Self::DownloadComplete { release_hash }
            | Self::Stabilized { release_hash } => json!({ "releaseHash": release_hash }),
            Self::DownloadProgress {
                release_hash,
                progress,
            } => json!({ "releaseHash": release_hash, "progress": progress }),
            Self::DownloadError { release_hash, meta }
            | Self::RolledBack {
                release_hash, meta, ..
            } => json!({ "releaseHash": release_hash, "meta": meta }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: EngineEvent);
}

/// Sink that renders events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: EngineEvent) {
        let payload = Value::Object(event.payload());
        match event {
            EngineEvent::SyncError { .. } | EngineEvent::DownloadError { .. } => {
                warn!(event = event.event_type(), %payload, "engine event");
            }
            _ => info!(event = event.event_type(), %payload, "engine event"),
        }
    }
}

/// Sink that forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        let started = EngineEvent::DownloadStarted {
            release_hash: "h".to_string(),
        };
        assert_eq!(started.event_type(), "DOWNLOAD_STARTED_PROD");

        let auto = EngineEvent::RolledBack {
            release_hash: "h".to_string(),
            automatic: true,
            meta: "crash".to_string(),
        };
        assert_eq!(auto.event_type(), "AUTO_ROLLED_BACK_PROD");

        let manual = EngineEvent::RolledBack {
            release_hash: "h".to_string(),
            automatic: false,
            meta: String::new(),
        };
        assert_eq!(manual.event_type(), "ROLLED_BACK_PROD");
    }

    #[test]
    fn test_payloads() {
        let error = EngineEvent::DownloadError {
            release_hash: "abc".to_string(),
            meta: "SIZE_UNKNOWN: file size is zero or unknown".to_string(),
        };
        let payload = error.payload();
        assert_eq!(payload["releaseHash"], "abc");
        assert!(payload["meta"].as_str().unwrap().starts_with("SIZE_UNKNOWN"));

        let sync = EngineEvent::SyncError {
            meta: "offline".to_string(),
        };
        assert_eq!(sync.payload()["meta"], "offline");
        assert!(!sync.payload().contains_key("releaseHash"));
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.emit(EngineEvent::DownloadComplete {
            release_hash: "abc".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "DOWNLOAD_COMPLETE_PROD");
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(EngineEvent::SyncError {
            meta: "ignored".to_string(),
        });
    }
}
