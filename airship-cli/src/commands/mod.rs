//! CLI command implementations.

pub mod common;
pub mod slots;
pub mod sync;
