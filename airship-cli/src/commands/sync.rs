//! The `sync` command: one sync cycle as a mounted host.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use airship::events::{ChannelEventSink, EventSink, TracingEventSink};
use airship::host::SharedHostState;
use airship::sync::SyncOutcome;
use airship::{Collaborators, Engine, EngineConfig, EngineEvent, EngineResult};

use crate::error::CliError;

/// Forwards events to the progress display and to the log.
struct CliEventSink {
    channel: ChannelEventSink,
}

impl EventSink for CliEventSink {
    fn emit(&self, event: EngineEvent) {
        TracingEventSink.emit(event.clone());
        self.channel.emit(event);
    }
}

/// Run a sync cycle and wait for any download it starts.
///
/// A release deferred by an earlier, unmounted run is downloaded first.
pub fn run(config: EngineConfig) -> Result<(), CliError> {
    let (channel, mut events) = ChannelEventSink::new();
    let host = Arc::new(SharedHostState::with_persistence(config.pending_release_path()));
    let parts = Collaborators::defaults(&config)?
        .with_events(Arc::new(CliEventSink { channel }))
        .with_host(host);
    let engine = Engine::start_sync(config, parts)?;

    let result = engine
        .block_on(drive(&engine, &mut events))
        .unwrap_or_else(|| Err(CliError::Task("engine has no runtime".to_string())));

    // Dropped here, outside the runtime.
    drop(engine);
    result
}

async fn drive(
    engine: &Engine,
    events: &mut UnboundedReceiver<EngineEvent>,
) -> Result<(), CliError> {
    if let Some(download) = engine.on_host_mounted() {
        println!("Downloading deferred release");
        return wait_for_download(download, events).await;
    }

    let cycle = engine
        .sync()
        .ok_or_else(|| CliError::Task("a sync is already running".to_string()))?;
    let outcome = cycle.await.map_err(|e| CliError::Task(e.to_string()))?;

    match outcome {
        SyncOutcome::NoUpdate => {
            println!("{} Already up to date", style("✓").green());
            Ok(())
        }
        SyncOutcome::Suppressed { release_hash } => {
            println!(
                "{} Release {} was rolled back before; not downloading",
                style("!").yellow(),
                release_hash
            );
            Ok(())
        }
        SyncOutcome::Deferred(pending) => {
            println!("Release {} deferred until the host mounts", pending.release_hash);
            Ok(())
        }
        SyncOutcome::DownloadBusy => {
            println!("Another download is already running");
            Ok(())
        }
        SyncOutcome::DownloadStarted(download) => wait_for_download(download, events).await,
        SyncOutcome::Failed(e) => Err(e.into()),
    }
}

async fn wait_for_download(
    mut download: JoinHandle<EngineResult<()>>,
    events: &mut UnboundedReceiver<EngineEvent>,
) -> Result<(), CliError> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let result = loop {
        tokio::select! {
            result = &mut download => break result,
            Some(event) = events.recv() => render(&bar, &event),
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&bar, &event);
    }

    match result.map_err(|e| CliError::Task(e.to_string()))? {
        Ok(()) => {
            bar.finish_with_message("done");
            println!("{} Bundle staged; it is used on the next launch", style("✓").green());
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            Err(e.into())
        }
    }
}

fn render(bar: &ProgressBar, event: &EngineEvent) {
    match event {
        EngineEvent::DownloadStarted { release_hash } => {
            bar.set_message(format!("downloading {}", release_hash))
        }
        EngineEvent::DownloadResumed { release_hash } => {
            bar.set_message(format!("resuming {}", release_hash))
        }
        EngineEvent::DownloadProgress { progress, .. } => {
            bar.set_position((progress * 100.0).round() as u64)
        }
        EngineEvent::DownloadComplete { .. } => bar.set_position(100),
        _ => {}
    }
}
