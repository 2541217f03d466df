//! Outbound message union for the transport front-ends.
//!
//! Every message a client can receive is one variant of [`ServerMessage`];
//! transports serialize it as JSON with a `type` tag and never construct
//! payloads of their own. Players are identified by player number throughout;
//! addresses never leave the auth/chain layer.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::types::entities::LeaderboardEntry;
use crate::types::enums::{EliminationReason, GamePhase, SubPhase};
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Zone state as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    /// Zone center.
    pub center: GeoPoint,
    /// Current radius in meters.
    pub radius_meters: u32,
    /// When the next shrink fires, if any remain.
    pub next_shrink_at: Option<UnixSeconds>,
    /// Radius after the next shrink.
    pub next_radius_meters: Option<u32>,
}

/// Full game snapshot for lifecycle reads and auth responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Game id.
    pub game_id: GameId,
    /// Top-level phase.
    pub phase: GamePhase,
    /// Sub-phase when ACTIVE.
    pub sub_phase: Option<SubPhase>,
    /// Registered players.
    pub player_count: u32,
    /// Players still alive.
    pub alive_count: u32,
    /// Players checked in.
    pub checked_in_count: u32,
    /// Zone state when ACTIVE.
    pub zone: Option<ZoneStatus>,
    /// Alive-first, kills-desc, number-asc ordering.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Timeout-based heartbeat elimination suspended for this game.
    pub heartbeat_disabled: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER MESSAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of messages the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Authenticated; carries the caller's identity and a full snapshot.
    #[serde(rename = "auth:success")]
    AuthSuccess {
        /// Game scope.
        game_id: GameId,
        /// Caller's number.
        player_number: PlayerNumber,
        /// Caller still alive.
        is_alive: bool,
        /// Caller checked in.
        checked_in: bool,
        /// Current snapshot.
        status: GameStatus,
    },

    /// The game entered the check-in window.
    #[serde(rename = "game:checkin_started")]
    CheckinStarted {
        /// Game scope.
        game_id: GameId,
        /// Check-ins needed before pregame can begin.
        required: u32,
    },

    /// A player checked in.
    #[serde(rename = "checkin:update")]
    CheckinUpdate {
        /// Game scope.
        game_id: GameId,
        /// The player who checked in.
        player_number: PlayerNumber,
        /// Total checked in.
        checked_in_count: u32,
        /// Check-ins needed before pregame can begin.
        required: u32,
    },

    /// Enough players checked in; countdown running.
    #[serde(rename = "game:pregame_started")]
    PregameStarted {
        /// Game scope.
        game_id: GameId,
        /// Seconds until the hunt begins.
        starts_in_seconds: i64,
    },

    /// The hunt began (broadcast form, no target).
    #[serde(rename = "game:started_broadcast")]
    GameStartedBroadcast {
        /// Game scope.
        game_id: GameId,
    },

    /// The hunt began (per-player form with the initial target).
    #[serde(rename = "game:started")]
    GameStarted {
        /// Game scope.
        game_id: GameId,
        /// This player's assigned target.
        target_number: PlayerNumber,
    },

    /// A kill was verified and recorded.
    #[serde(rename = "kill:recorded")]
    KillRecorded {
        /// Game scope.
        game_id: GameId,
        /// The hunter.
        hunter_number: PlayerNumber,
        /// The eliminated target.
        target_number: PlayerNumber,
        /// Verified distance.
        distance_meters: f64,
    },

    /// A player left the alive set.
    #[serde(rename = "player:eliminated")]
    PlayerEliminated {
        /// Game scope.
        game_id: GameId,
        /// The eliminated player.
        player_number: PlayerNumber,
        /// Why.
        reason: EliminationReason,
    },

    /// Per-player: your target changed.
    #[serde(rename = "target:assigned")]
    TargetAssigned {
        /// Game scope.
        game_id: GameId,
        /// The new target.
        target_number: PlayerNumber,
    },

    /// Per-player: the player hunting you changed.
    #[serde(rename = "hunter:updated")]
    HunterUpdated {
        /// Game scope.
        game_id: GameId,
    },

    /// The zone shrank.
    #[serde(rename = "zone:shrink")]
    ZoneShrink {
        /// Game scope.
        game_id: GameId,
        /// New radius.
        radius_meters: u32,
        /// Next scheduled shrink, for client display.
        next_shrink_at: Option<UnixSeconds>,
        /// Radius after the next shrink.
        next_radius_meters: Option<u32>,
    },

    /// Per-player: outside the zone, countdown running.
    #[serde(rename = "zone:warning")]
    ZoneWarning {
        /// Game scope.
        game_id: GameId,
        /// Seconds left before elimination.
        seconds_remaining: i64,
    },

    /// Per-player: back inside the zone.
    #[serde(rename = "zone:ok")]
    ZoneOk {
        /// Game scope.
        game_id: GameId,
    },

    /// Standings changed.
    #[serde(rename = "leaderboard:update")]
    LeaderboardUpdate {
        /// Game scope.
        game_id: GameId,
        /// Current standings.
        leaderboard: Vec<LeaderboardEntry>,
    },

    /// Per-player: someone scanned you; your heartbeat is fresh.
    #[serde(rename = "heartbeat:refreshed")]
    HeartbeatRefreshed {
        /// Game scope.
        game_id: GameId,
        /// New heartbeat timestamp.
        last_heartbeat_at: UnixSeconds,
    },

    /// Per-player: your scan of another player was accepted.
    #[serde(rename = "heartbeat:scan_success")]
    HeartbeatScanSuccess {
        /// Game scope.
        game_id: GameId,
        /// Who you scanned.
        scanned_number: PlayerNumber,
    },

    /// Per-player: your scan was rejected.
    #[serde(rename = "heartbeat:error")]
    HeartbeatError {
        /// Game scope.
        game_id: GameId,
        /// Structured error code.
        code: String,
    },

    /// The game ended.
    #[serde(rename = "game:ended")]
    GameEnded {
        /// Game scope.
        game_id: GameId,
        /// Winner's number.
        first: PlayerNumber,
        /// Second place.
        second: Option<PlayerNumber>,
        /// Third place.
        third: Option<PlayerNumber>,
        /// Most kills.
        top_killer: PlayerNumber,
    },

    /// The game was cancelled or expired.
    #[serde(rename = "game:cancelled")]
    GameCancelled {
        /// Game scope.
        game_id: GameId,
    },

    /// A player registered during REGISTRATION.
    #[serde(rename = "player:registered")]
    PlayerRegistered {
        /// Game scope.
        game_id: GameId,
        /// The new player's number.
        player_number: PlayerNumber,
        /// Updated registration count.
        player_count: u32,
    },

    /// Structured error for a rejected player action.
    #[serde(rename = "error")]
    Error {
        /// Stable error code (`INVALID_QR`, `OUT_OF_RANGE`, ...).
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_wire_type_tag() {
        let msg = ServerMessage::ZoneWarning {
            game_id: GameId::new(3),
            seconds_remaining: 42,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "zone:warning");
        assert_eq!(json["seconds_remaining"], 42);
    }

    #[test]
    fn kill_recorded_round_trips() {
        let msg = ServerMessage::KillRecorded {
            game_id: GameId::new(1),
            hunter_number: PlayerNumber::new(2),
            target_number: PlayerNumber::new(5),
            distance_meters: 48.5,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<ServerMessage>(&json).unwrap(), msg);
    }

    #[test]
    fn elimination_reason_serializes_snake_case() {
        let msg = ServerMessage::PlayerEliminated {
            game_id: GameId::new(1),
            player_number: PlayerNumber::new(9),
            reason: EliminationReason::ZoneViolation,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["reason"], "zone_violation");
    }
}
