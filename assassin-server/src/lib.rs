//! Off-chain game server for the on-chain assassin elimination game.
//!
//! The server runs each match in real time - check-in, the circular
//! hunter→target chain, kill verification, the shrinking play zone, and
//! heartbeat liveness - while the contract stays authoritative for funds,
//! phase transitions, and final outcomes. One operator identity writes
//! canonical results back on-chain through a serialized queue; a chain
//! listener reconciles on-chain truth with local state.
//!
//! # Architecture
//!
//! ```text
//! chain event ──▶ listener ──▶ manager ──▶ per-game actors ──▶ store
//!                                 │             │
//!                                 ▼             ▼
//!                            broadcaster   operator queue ──▶ chain
//! ```

pub mod abi;
pub mod chain;
pub mod config;
pub mod error;
pub mod fanout;
pub mod game;
pub mod geo;
pub mod listener;
pub mod ports;
pub mod proof;
pub mod queue;
pub mod store;
pub mod types;

/// Crate version from Cargo metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
