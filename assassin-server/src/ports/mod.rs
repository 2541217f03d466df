//! Port traits decoupling the engine from infrastructure.
//!
//! - [`store`] - persistence contract, implemented by the SQLite adapter
//! - [`chain`] - typed contract reads, implemented by the RPC reader
//! - [`broadcast`] - client fan-out, implemented by the channel broadcaster
//!
//! The game engine only ever sees these traits, so tests run against mocks
//! and in-memory implementations.

pub mod broadcast;
pub mod chain;
pub mod store;

pub use broadcast::Broadcaster;
pub use chain::{ChainGameState, ChainPlayer, GameChain};
pub use store::{EliminationUpdate, PhaseUpdate, RewireUpdate, Store};
