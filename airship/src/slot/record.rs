//! Durable slot record.

use serde::{Deserialize, Serialize};

/// Which slot the host runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    /// The stable, promoted build.
    #[default]
    Current,
    /// A verified build that has not been promoted yet.
    New,
}

/// Build waiting to become CURRENT.
///
/// At most one generation is pending at a time. A downloaded build starts
/// as [`Pipeline::Temp`], moves to [`Pipeline::New`] when the host boots it
/// and leaves the pipeline when stabilized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum Pipeline {
    #[default]
    Idle,
    Temp { hash: String },
    New { hash: String },
}

impl Pipeline {
    /// Hash of the pending build, at any stage.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Temp { hash } | Self::New { hash } => Some(hash),
        }
    }
}

/// Everything the engine knows about deployed builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotRecord {
    pub current_slot: SlotState,
    pub pipeline: Pipeline,
    /// Hash of the CURRENT build; empty before the first promotion.
    pub active_release_hash: String,
    /// CURRENT build replaced by the last promotion, the rollback target.
    pub previous_release_hash: Option<String>,
    /// Hash abandoned by the last rollback; never downloaded again.
    pub last_rolled_back_hash: Option<String>,
}

impl SlotRecord {
    /// Hash waiting in NEW.
    pub fn new_hash(&self) -> Option<&str> {
        match &self.pipeline {
            Pipeline::New { hash } => Some(hash),
            _ => None,
        }
    }

    /// Most recently downloaded, not yet booted hash.
    pub fn temp_hash(&self) -> Option<&str> {
        match &self.pipeline {
            Pipeline::Temp { hash } => Some(hash),
            _ => None,
        }
    }

    /// Whether `hash` was abandoned by a rollback.
    pub fn is_suppressed(&self, hash: &str) -> bool {
        self.last_rolled_back_hash.as_deref() == Some(hash)
    }
}
