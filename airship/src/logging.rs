//! Tracing subscriber setup for hosts that have none.
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`, `debug` when
//! verbose). With a log directory, a daily-rotated file receives the same
//! events through a non-blocking writer.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file name prefix inside the log directory.
pub const LOG_FILE_PREFIX: &str = "airship.log";

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Lower the default level to `debug`.
    pub verbose: bool,
    /// Also write logs into this directory.
    pub log_dir: Option<PathBuf>,
}

impl LoggingOptions {
    fn default_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            DEFAULT_LOG_LEVEL
        }
    }
}

/// Install the global subscriber.
///
/// Hold the returned guard for the life of the process when a log
/// directory was given; dropping it flushes and stops the file writer.
pub fn init_logging(options: &LoggingOptions) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_level()));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(guard)
}
