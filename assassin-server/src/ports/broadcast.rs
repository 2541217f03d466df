//! Client fan-out port.
//!
//! Whichever task produces an event pushes it through this port. Sends are
//! non-blocking: a slow or absent consumer never stalls a tick, and dropped
//! spectator messages are acceptable by design of the transport layer.

use crate::types::messages::ServerMessage;
use crate::types::primitives::{GameId, PlayerNumber};

/// Outbound message sink for transports (WebSocket front-end, spectators).
pub trait Broadcaster: Send + Sync {
    /// Deliver to one player of one game.
    fn send_to_player(&self, game_id: GameId, player: PlayerNumber, message: &ServerMessage);

    /// Deliver to every connected client of one game.
    fn broadcast(&self, game_id: GameId, message: &ServerMessage);
}
