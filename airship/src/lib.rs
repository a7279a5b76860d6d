//! Airship - over-the-air bundle updates for embedded application runtimes
//!
//! This library is the client-side engine of an OTA update mechanism. It
//! asks a release service for a newer application bundle, downloads it with
//! resume support and integrity checks, and stages it through a slot
//! pipeline (TEMP → NEW → CURRENT) that the host adopts on its next launch.
//! Builds that were rolled back are never downloaded again.
//!
//! # Modules
//!
//! - [`sync`]: single-flight sync cycles and download triggering
//! - [`download`]: resumable downloads, resume cache and archive checks
//! - [`slot`]: the slot record and its promotion state machine
//! - [`release`]: release-check request/response handling
//! - [`app`]: wiring of all of the above into an [`Engine`]

pub mod app;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod fs;
pub mod host;
pub mod logging;
pub mod release;
pub mod slot;
pub mod sync;
pub mod transport;

pub use app::{Collaborators, Engine};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{EngineEvent, EventSink};

/// Version of the airship library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
