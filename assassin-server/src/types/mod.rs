//! Domain types for the game server.
//!
//! Organized following a strict layering:
//!
//! - [`primitives`] - validated newtypes (game id, player number, timestamps)
//! - [`enums`] - closed enumerations (phase, sub-phase, elimination reason)
//! - [`entities`] - aggregate state (game, player, kill, pings, queue entries)
//! - [`events`] - decoded chain events with block metadata
//! - [`messages`] - the outbound `ServerMessage` tagged union

pub mod entities;
pub mod enums;
pub mod events;
pub mod messages;
pub mod primitives;

pub use entities::{
    Game, GamePhoto, HeartbeatScan, Kill, LeaderboardEntry, LocationPing, NewGame, OperatorTx,
    Player, PrizeSplit, SyncCursor, TargetAssignment, Winners, ZoneShrink,
};
pub use enums::{EliminationReason, GamePhase, OperatorTxStatus, SubPhase};
pub use events::{EventMetadata, GameEvent};
pub use messages::{GameStatus, ServerMessage, ZoneStatus};
pub use primitives::{GameId, PlayerNumber, UnixSeconds};
