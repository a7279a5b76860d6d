//! Engine bootstrap.
//!
//! [`Engine`] wires the download manager, slot machine and sync
//! coordinator from an [`EngineConfig`](crate::config::EngineConfig) and a
//! set of [`Collaborators`].
//!
//! # Example
//!
//! ```ignore
//! use airship::app::{Collaborators, Engine};
//!
//! let parts = Collaborators::defaults(&config)?;
//! let engine = Engine::start_sync(config, parts)?;
//!
//! engine.coordinator().host().set_mounted(true);
//! if let Some(cycle) = engine.sync() {
//!     engine.block_on(cycle);
//! }
//! ```

mod bootstrap;

pub use bootstrap::{Collaborators, Engine};
