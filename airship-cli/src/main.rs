//! Airship CLI - Command-line host for the OTA update engine
//!
//! This binary plays the embedding application: it runs sync cycles,
//! shows download progress and drives slot transitions by hand.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;

use airship::logging::{init_logging, LoggingOptions};

use crate::commands::{common, slots, sync};
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "airship")]
#[command(version, about = "Over-the-air bundle updates", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/airship/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check for a release and download it
    Sync,
    /// Show the slot record
    Status,
    /// Adopt the downloaded build, as the host does when it boots it
    Launch,
    /// Promote the launched build to current
    Stabilize,
    /// Abandon the running build and never download it again
    Rollback {
        /// Reason recorded with the rollback event
        #[arg(long, default_value = "")]
        reason: String,

        /// Mark the rollback as automatic (e.g. after a crash on boot)
        #[arg(long)]
        automatic: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _log_guard = init_logging(&LoggingOptions {
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    })
    .map_err(CliError::Logging)?;

    let config = common::load_config(cli.config.as_deref())?;
    debug!(
        files_dir = %config.files_dir.display(),
        version = airship::VERSION,
        "Loaded configuration"
    );

    match cli.command {
        Commands::Sync => sync::run(config),
        Commands::Status => slots::status(&config),
        Commands::Launch => slots::launch(&config),
        Commands::Stabilize => slots::stabilize(&config),
        Commands::Rollback { reason, automatic } => slots::rollback(&config, automatic, &reason),
    }
}
