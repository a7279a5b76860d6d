//! Sync coordination.

mod coordinator;
mod flight;

pub use coordinator::{SyncCoordinator, SyncOutcome, SERVER_ROLLBACK_REASON};
pub use flight::{FlightGuard, SingleFlight};
