//! Slot promotion state machine.
//!
//! Builds move through TEMP (downloaded) → NEW (booted, not yet trusted) →
//! CURRENT (stable). Every transition works on a copy of the record, saves
//! the copy through the [`SlotStore`] and only then replaces the in-memory
//! record, so a failed save leaves both the disk and memory untouched.
//!
//! All transitions are serialized through one lock; a rollback requested
//! while a promotion is being written waits for that promotion to commit
//! and then applies to the promoted state.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::record::{Pipeline, SlotRecord, SlotState};
use super::store::SlotStore;
use crate::error::EngineResult;
use crate::events::{EngineEvent, EventSink};

/// Owner of the [`SlotRecord`] and its transitions.
pub struct SlotMachine {
    store: Arc<dyn SlotStore>,
    events: Arc<dyn EventSink>,
    record: Mutex<SlotRecord>,
}

impl SlotMachine {
    /// Load the record from `store`.
    pub fn open(store: Arc<dyn SlotStore>, events: Arc<dyn EventSink>) -> EngineResult<Self> {
        let record = store.load()?;
        debug!(
            active = %record.active_release_hash,
            pending = ?record.pipeline.hash(),
            "Loaded slot record"
        );
        Ok(Self {
            store,
            events,
            record: Mutex::new(record),
        })
    }

    /// Copy of the committed record.
    pub fn snapshot(&self) -> SlotRecord {
        self.record.lock().clone()
    }

    pub fn active_release_hash(&self) -> String {
        self.record.lock().active_release_hash.clone()
    }

    /// Whether `hash` must never be downloaded again.
    pub fn is_suppressed(&self, hash: &str) -> bool {
        self.record.lock().is_suppressed(hash)
    }

    /// Apply `change` to a copy of the record and commit it.
    fn transition<T>(&self, change: impl FnOnce(&mut SlotRecord) -> T) -> EngineResult<T> {
        let mut guard = self.record.lock();
        let mut next = guard.clone();
        let result = change(&mut next);
        if next != *guard {
            self.store.save(&next)?;
            *guard = next;
        }
        Ok(result)
    }

    /// Stage a freshly downloaded build.
    ///
    /// A build still waiting in NEW is stabilized first, so a verified
    /// generation is never dropped in favour of a newer one. The result is
    /// written once; the engine reports download success only after this
    /// returns.
    pub fn on_download_success(&self, hash: &str) -> EngineResult<()> {
        let promoted = self.transition(|record| {
            let promoted = promote(record);
            record.current_slot = SlotState::New;
            record.pipeline = Pipeline::Temp {
                hash: hash.to_string(),
            };
            promoted
        })?;

        if let Some(promoted) = promoted {
            info!(hash = %promoted, "Stabilized pending build before staging a new one");
            self.events.emit(EngineEvent::Stabilized {
                release_hash: promoted,
            });
        }
        info!(hash = %hash, "Staged downloaded build");
        Ok(())
    }

    /// Adopt the downloaded TEMP build into NEW.
    ///
    /// Returns the adopted hash, or `None` when nothing was downloaded.
    pub fn launch_downloaded(&self) -> EngineResult<Option<String>> {
        let adopted = self.transition(|record| match &record.pipeline {
            Pipeline::Temp { hash } => {
                let hash = hash.clone();
                record.pipeline = Pipeline::New { hash: hash.clone() };
                record.current_slot = SlotState::New;
                Some(hash)
            }
            _ => None,
        })?;

        if let Some(hash) = &adopted {
            info!(hash = %hash, "Launched downloaded build");
        }
        Ok(adopted)
    }

    /// Promote the NEW build to CURRENT.
    ///
    /// Returns the promoted hash; a no-op returning `None` when no build
    /// waits in NEW.
    pub fn stabilize(&self) -> EngineResult<Option<String>> {
        let promoted = self.transition(promote)?;

        match &promoted {
            Some(hash) => {
                info!(hash = %hash, "Stabilized build");
                self.events.emit(EngineEvent::Stabilized {
                    release_hash: hash.clone(),
                });
            }
            None => debug!("Nothing to stabilize"),
        }
        Ok(promoted)
    }

    /// Abandon the running build.
    ///
    /// A booted but unpromoted NEW build is abandoned first; otherwise the
    /// CURRENT build is replaced by the one it superseded. The abandoned
    /// hash becomes `last_rolled_back_hash` and any pending state
    /// referencing it is cleared. Returns the abandoned hash, or `None`
    /// when there is nothing to roll back.
    pub fn rollback(&self, automatic: bool, reason: &str) -> EngineResult<Option<String>> {
        let abandoned = self.transition(|record| {
            if let Some(hash) = record.new_hash().map(str::to_string) {
                record.pipeline = Pipeline::Idle;
                record.current_slot = SlotState::Current;
                record.last_rolled_back_hash = Some(hash.clone());
                return Some(hash);
            }

            if record.active_release_hash.is_empty() {
                return None;
            }

            let abandoned = std::mem::take(&mut record.active_release_hash);
            record.active_release_hash = record.previous_release_hash.take().unwrap_or_default();
            if record.pipeline.hash() == Some(abandoned.as_str()) {
                record.pipeline = Pipeline::Idle;
            }
            if record.pipeline == Pipeline::Idle {
                record.current_slot = SlotState::Current;
            }
            record.last_rolled_back_hash = Some(abandoned.clone());
            Some(abandoned)
        })?;

        match &abandoned {
            Some(hash) => {
                warn!(hash = %hash, automatic, reason, "Rolled back build");
                self.events.emit(EngineEvent::RolledBack {
                    release_hash: hash.clone(),
                    automatic,
                    meta: reason.to_string(),
                });
            }
            None => debug!("Nothing to roll back"),
        }
        Ok(abandoned)
    }
}

/// Move a NEW build to CURRENT, returning its hash.
fn promote(record: &mut SlotRecord) -> Option<String> {
    let hash = record.new_hash()?.to_string();
    let previous = std::mem::replace(&mut record.active_release_hash, hash.clone());
    record.previous_release_hash = Some(previous).filter(|h| !h.is_empty());
    record.pipeline = Pipeline::Idle;
    record.current_slot = SlotState::Current;
    Some(hash)
}
