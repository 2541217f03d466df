//! Channel-based implementation of the broadcast port.
//!
//! Transports (the WebSocket front-end, the spectator feed) subscribe to
//! the broadcast channel and filter envelopes for their connections. Sends
//! never block and never fail: with no subscriber the envelope is simply
//! dropped, which is the correct behavior for an empty venue.

use tokio::sync::broadcast;
use tracing::trace;

use crate::ports::broadcast::Broadcaster;
use crate::types::messages::ServerMessage;
use crate::types::primitives::{GameId, PlayerNumber};

/// Channel capacity. Slow consumers beyond this lag are dropped by the
/// broadcast channel's own semantics.
const CHANNEL_CAPACITY: usize = 1024;

/// One outbound message with its routing scope.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    /// The game the message belongs to.
    pub game_id: GameId,
    /// Deliver to this player only, or to everyone when `None`.
    pub recipient: Option<PlayerNumber>,
    /// The message payload.
    pub message: ServerMessage,
}

/// Broadcast-channel fan-out.
#[derive(Debug)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<OutboundEnvelope>,
}

impl ChannelBroadcaster {
    /// Create a broadcaster with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe a transport to the outbound stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEnvelope> {
        self.tx.subscribe()
    }

    fn send(&self, envelope: OutboundEnvelope) {
        trace!(game_id = %envelope.game_id, recipient = ?envelope.recipient, "fan-out");
        // An error only means no subscriber is listening right now.
        let _ = self.tx.send(envelope);
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn send_to_player(&self, game_id: GameId, player: PlayerNumber, message: &ServerMessage) {
        self.send(OutboundEnvelope {
            game_id,
            recipient: Some(player),
            message: message.clone(),
        });
    }

    fn broadcast(&self, game_id: GameId, message: &ServerMessage) {
        self.send(OutboundEnvelope {
            game_id,
            recipient: None,
            message: message.clone(),
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
