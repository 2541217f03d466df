//! The game engine.
//!
//! - [`target_chain`] - the circular hunter→target structure
//! - [`zone`] - shrink schedule and out-of-zone grace enforcement
//! - [`heartbeat`] - liveness scans and the auto-disable latch
//! - [`kill`] - the kill verification pipeline
//! - [`checkin`] - seed-slot and viral co-presence check-in policy
//! - [`actor`] - one task per active game owning all of its mutations
//! - [`manager`] - lifecycle orchestration, timers, chain-event reactions

pub mod actor;
pub mod checkin;
pub mod heartbeat;
pub mod kill;
pub mod manager;
pub mod target_chain;
pub mod zone;

pub use actor::{GameCommand, GameDeps, GameHandle};
pub use manager::GameManager;
