//! CLI error type.

use std::io;
use std::path::PathBuf;

use airship::{ConfigError, EngineError};
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No configuration file at the resolved location.
    #[error("no configuration found at {0}; create it or pass --config")]
    ConfigNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{}", .0.reject_message())]
    Engine(#[from] EngineError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[source] io::Error),

    /// A background task ended abnormally.
    #[error("task failed: {0}")]
    Task(String),
}
