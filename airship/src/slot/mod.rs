//! Deployment slots.
//!
//! The [`SlotRecord`] is the single source of truth for which build is
//! active, which one is pending and which one was rolled back. Only the
//! [`SlotMachine`] mutates it, and every mutation is committed through a
//! [`SlotStore`].

mod machine;
mod record;
mod store;

pub use machine::SlotMachine;
pub use record::{Pipeline, SlotRecord, SlotState};
pub use store::{FileSlotStore, MemorySlotStore, SlotStore};
