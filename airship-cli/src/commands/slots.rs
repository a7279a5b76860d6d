//! Slot inspection and transition commands.

use console::style;

use airship::EngineConfig;

use super::common::{describe_record, open_slots};
use crate::error::CliError;

/// Print the slot record.
pub fn status(config: &EngineConfig) -> Result<(), CliError> {
    let slots = open_slots(config)?;
    println!("Slot record: {}", config.slot_record_path().display());
    for (label, value) in describe_record(&slots.snapshot()) {
        println!("  {:<18} {}", format!("{}:", label), value);
    }
    Ok(())
}

/// Adopt the downloaded build into NEW.
pub fn launch(config: &EngineConfig) -> Result<(), CliError> {
    match open_slots(config)?.launch_downloaded()? {
        Some(hash) => println!("{} Launched build {}", style("✓").green(), style(hash).bold()),
        None => println!("No downloaded build to launch"),
    }
    Ok(())
}

/// Promote the NEW build to CURRENT.
pub fn stabilize(config: &EngineConfig) -> Result<(), CliError> {
    match open_slots(config)?.stabilize()? {
        Some(hash) => println!(
            "{} Build {} is now current",
            style("✓").green(),
            style(hash).bold()
        ),
        None => println!("No launched build to stabilize"),
    }
    Ok(())
}

/// Abandon the running build.
pub fn rollback(config: &EngineConfig, automatic: bool, reason: &str) -> Result<(), CliError> {
    let slots = open_slots(config)?;
    match slots.rollback(automatic, reason)? {
        Some(hash) => {
            println!("{} Rolled back build {}", style("↩").yellow(), style(hash).bold());
            let active = slots.active_release_hash();
            if active.is_empty() {
                println!("  Now running the embedded bundle");
            } else {
                println!("  Now running {}", active);
            }
        }
        None => println!("Nothing to roll back"),
    }
    Ok(())
}
