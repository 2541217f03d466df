//! Aggregate entities mirrored between the chain and the store.
//!
//! The chain owns phase transitions, winner attestation, escrow, and claim
//! state; the server owns everything else (sub-phases, targets, pings,
//! heartbeats, the operator log). A game row is only ever created from a
//! confirmed chain event or a rebuild read.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::types::enums::{EliminationReason, GamePhase, SubPhase};
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

// ═══════════════════════════════════════════════════════════════════════════════
// GAME
// ═══════════════════════════════════════════════════════════════════════════════

/// Basis-point allocation of the escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSplit {
    /// Share of escrow for first place.
    pub first_bps: u16,
    /// Share for second place.
    pub second_bps: u16,
    /// Share for third place.
    pub third_bps: u16,
    /// Share for the most kills.
    pub kills_bps: u16,
    /// Share for the game creator.
    pub creator_bps: u16,
}

impl PrizeSplit {
    /// Number of placement prizes with a non-zero allocation (0..=3).
    #[must_use]
    pub const fn placement_count(&self) -> u32 {
        (self.first_bps > 0) as u32 + (self.second_bps > 0) as u32 + (self.third_bps > 0) as u32
    }
}

/// Final winner tuple, attested on-chain at game end.
///
/// Second and third are absent for games too small to fill the podium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winners {
    /// Last player standing.
    pub first: Address,
    /// Second-to-last eliminated.
    pub second: Option<Address>,
    /// Third-to-last eliminated.
    pub third: Option<Address>,
    /// Most kills (ties broken by lowest player number).
    pub top_killer: Address,
}

/// One game, mirrored from the chain plus server-owned live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Chain-assigned id.
    pub id: GameId,
    /// Display title.
    pub title: String,
    /// Game creator's address.
    pub creator: Address,
    /// Entry fee in wei.
    pub entry_fee_wei: U256,
    /// Base reward added to escrow by the creator, in wei.
    pub base_reward_wei: U256,
    /// Escrow allocation.
    pub split: PrizeSplit,
    /// Center of the shrinking play zone.
    pub zone_center: GeoPoint,
    /// Where players gather for check-in.
    pub meeting_point: GeoPoint,
    /// Registration closes at this time.
    pub registration_deadline: UnixSeconds,
    /// Scheduled start of the in-venue portion.
    pub game_date: UnixSeconds,
    /// Maximum active duration in seconds; expiry = `game_date + max_duration`.
    pub max_duration_secs: i64,
    /// Minimum registrations for the game to start.
    pub min_players: u32,
    /// Mirrored top-level phase.
    pub phase: GamePhase,
    /// Server-owned sub-phase; non-null iff phase = ACTIVE.
    pub sub_phase: Option<SubPhase>,
    /// When the current sub-phase began.
    pub sub_phase_started_at: Option<UnixSeconds>,
    /// When the ACTIVE phase began.
    pub started_at: Option<UnixSeconds>,
    /// When the game ended or was cancelled.
    pub ended_at: Option<UnixSeconds>,
    /// Registered player count (mirrored).
    pub player_count: u32,
    /// Total escrow collected in wei (mirrored).
    pub total_collected_wei: U256,
    /// Winner tuple once ENDED.
    pub winners: Option<Winners>,
}

impl Game {
    /// The permissionless expiry deadline.
    #[must_use]
    pub const fn expiry_at(&self) -> UnixSeconds {
        self.game_date + self.max_duration_secs
    }

    /// Whether the game is in the given sub-phase right now.
    #[must_use]
    pub fn in_sub_phase(&self, sub: SubPhase) -> bool {
        self.phase == GamePhase::Active && self.sub_phase == Some(sub)
    }
}

/// Parameters for creating a new game on-chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGame {
    /// Display title.
    pub title: String,
    /// Entry fee in wei.
    pub entry_fee_wei: U256,
    /// Base reward in wei.
    pub base_reward_wei: U256,
    /// Escrow allocation.
    pub split: PrizeSplit,
    /// Zone center.
    pub zone_center: GeoPoint,
    /// Meeting point.
    pub meeting_point: GeoPoint,
    /// Registration deadline.
    pub registration_deadline: UnixSeconds,
    /// Scheduled game date.
    pub game_date: UnixSeconds,
    /// Maximum active duration in seconds.
    pub max_duration_secs: i64,
    /// Minimum players.
    pub min_players: u32,
    /// Shrink schedule, first entry at second 0.
    pub zone_shrinks: Vec<ZoneShrink>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ZONE
// ═══════════════════════════════════════════════════════════════════════════════

/// One step of the shrink schedule.
///
/// Schedules are strictly increasing in `at_second`, non-increasing in
/// radius, and begin at second 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneShrink {
    /// Offset from `started_at`, in seconds.
    pub at_second: i64,
    /// Play radius from that point on, in meters.
    pub radius_meters: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYER
// ═══════════════════════════════════════════════════════════════════════════════

/// One registered player of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Game this row belongs to.
    pub game_id: GameId,
    /// Wallet address (on-chain identity).
    pub address: Address,
    /// Chain-assigned stable number.
    pub number: PlayerNumber,
    /// False-transitions at most once per game.
    pub is_alive: bool,
    /// Verified kill count.
    pub kills: u32,
    /// Monotone once true.
    pub checked_in: bool,
    /// Bluetooth identifier recorded at check-in, for BLE presence checks.
    pub bluetooth_id: Option<String>,
    /// Last accepted heartbeat scan (either side of the scan).
    pub last_heartbeat_at: Option<UnixSeconds>,
    /// When eliminated.
    pub eliminated_at: Option<UnixSeconds>,
    /// 1-based position in the game's elimination sequence.
    pub elimination_order: Option<u32>,
    /// Hunter credited with the elimination, if combat.
    pub eliminated_by: Option<Address>,
    /// Why the player was eliminated.
    pub elimination_reason: Option<EliminationReason>,
    /// Mirrored from the chain's claim state.
    pub has_claimed: bool,
}

/// Leaderboard line, ordered alive-first then kills then number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Player number.
    pub player_number: PlayerNumber,
    /// Kill count.
    pub kills: u32,
    /// Still in the game.
    pub is_alive: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TARGETS, KILLS, PINGS, SCANS
// ═══════════════════════════════════════════════════════════════════════════════

/// One edge of the hunter→target cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAssignment {
    /// Game scope.
    pub game_id: GameId,
    /// The pursuer.
    pub hunter: Address,
    /// The quarry.
    pub target: Address,
}

/// A verified kill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kill {
    /// Game scope.
    pub game_id: GameId,
    /// Who scanned.
    pub hunter: Address,
    /// Who was scanned.
    pub target: Address,
    /// When the kill was verified.
    pub timestamp: UnixSeconds,
    /// Hunter's submitted position.
    pub hunter_pos: GeoPoint,
    /// Target's position used for the distance check.
    pub target_pos: GeoPoint,
    /// Verified distance in meters.
    pub distance_meters: f64,
    /// On-chain transaction hash once confirmed.
    pub tx_hash: Option<String>,
}

/// Latest known position for a player in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    /// Game scope.
    pub game_id: GameId,
    /// Player address.
    pub address: Address,
    /// Reported position.
    pub point: GeoPoint,
    /// When reported.
    pub timestamp: UnixSeconds,
    /// Inside the current radius at report time.
    pub is_in_zone: bool,
}

/// Audit row for an accepted heartbeat scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatScan {
    /// Game scope.
    pub game_id: GameId,
    /// Who performed the scan.
    pub scanner: Address,
    /// Whose QR was scanned.
    pub scanned: Address,
    /// When accepted.
    pub timestamp: UnixSeconds,
    /// Scanner's position at scan time.
    pub scanner_pos: GeoPoint,
    /// Distance between the pair in meters.
    pub distance_meters: f64,
}

/// Kill-proof photo metadata. The binary itself lives outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePhoto {
    /// Game scope.
    pub game_id: GameId,
    /// Hunter who took the photo.
    pub hunter: Address,
    /// Target in the photo.
    pub target: Address,
    /// Capture time.
    pub taken_at: UnixSeconds,
    /// Content hash of the uploaded image.
    pub content_hash: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR LOG & SYNC STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// One entry of the persisted operator transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorTx {
    /// Store-assigned row id.
    pub id: i64,
    /// Game scope, when the action is game-bound.
    pub game_id: Option<GameId>,
    /// Action discriminant (`record_kill`, `end_game`, ...).
    pub action: String,
    /// JSON-encoded call parameters.
    pub params: String,
    /// Lifecycle status.
    pub status: crate::types::enums::OperatorTxStatus,
    /// Transaction hash once submitted.
    pub tx_hash: Option<String>,
    /// When the entry was logged.
    pub created_at: UnixSeconds,
    /// When the receipt confirmed.
    pub confirmed_at: Option<UnixSeconds>,
    /// Last submission error, for failed entries.
    pub last_error: Option<String>,
}

/// Listener cursor and the contract address it was built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Last fully processed block.
    pub last_processed_block: u64,
    /// Contract address the cursor belongs to. A changed address invalidates
    /// the cursor.
    pub contract_address: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
