//! Helpers shared across CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use airship::events::TracingEventSink;
use airship::slot::{FileSlotStore, SlotMachine, SlotRecord};
use airship::EngineConfig;

use crate::error::CliError;

/// Configuration file used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airship")
        .join("config.ini")
}

/// Load the engine configuration from `path`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.is_file() {
        return Err(CliError::ConfigNotFound(path));
    }
    Ok(EngineConfig::from_ini(&path)?)
}

/// Open the slot machine over the configured slot record.
pub fn open_slots(config: &EngineConfig) -> Result<SlotMachine, CliError> {
    let store = Arc::new(FileSlotStore::new(config.slot_record_path()));
    Ok(SlotMachine::open(store, Arc::new(TracingEventSink))?)
}

/// Render a slot record for humans.
pub fn describe_record(record: &SlotRecord) -> Vec<(&'static str, String)> {
    let or_none = |value: Option<&str>| value.unwrap_or("-").to_string();
    let active = record.active_release_hash.as_str();
    vec![
        ("Current slot", format!("{:?}", record.current_slot).to_uppercase()),
        ("Active release", or_none((!active.is_empty()).then_some(active))),
        ("Previous release", or_none(record.previous_release_hash.as_deref())),
        ("Downloaded (TEMP)", or_none(record.temp_hash())),
        ("Launched (NEW)", or_none(record.new_hash())),
        ("Last rolled back", or_none(record.last_rolled_back_hash.as_deref())),
    ]
}
