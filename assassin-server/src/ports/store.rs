//! Storage port traits for data persistence.
//!
//! These traits define the contract for persisting and retrieving domain
//! entities. The SQLite adapter implements them; the engine and tests only
//! see the traits.
//!
//! Multi-row transitions (eliminate + rewire + kill accounting) go through
//! the dedicated atomic methods so a crash can never leave the target cycle
//! and the player table disagreeing.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::error::Result;
use crate::types::entities::{
    Game, GamePhoto, HeartbeatScan, Kill, LocationPing, OperatorTx, Player, SyncCursor,
    TargetAssignment, Winners, ZoneShrink,
};
use crate::types::enums::{EliminationReason, GamePhase, OperatorTxStatus, SubPhase};
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fields that change together with a top-level phase transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseUpdate {
    /// Set `started_at`.
    pub started_at: Option<UnixSeconds>,
    /// Set `ended_at`.
    pub ended_at: Option<UnixSeconds>,
    /// New sub-phase; `None` clears it (phase leaving ACTIVE).
    pub sub_phase: Option<SubPhase>,
    /// When the new sub-phase began.
    pub sub_phase_started_at: Option<UnixSeconds>,
    /// Winner tuple for the ENDED transition.
    pub winners: Option<Winners>,
}

/// How the target cycle changes when a player is eliminated.
///
/// Computed by the in-memory target chain; the store applies it in the same
/// transaction as the elimination itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewireUpdate {
    /// The victim's hunter inherits the victim's target.
    Reassign {
        /// The hunter.
        hunter: Address,
        /// The inherited target.
        new_target: Address,
    },
    /// Remove the hunter's assignment (last player standing, or the victim
    /// had no target of their own).
    ClearHunter {
        /// The hunter.
        hunter: Address,
    },
    /// The victim had no recorded hunter; nothing to rewire.
    None,
}

/// One elimination with its cycle rewiring.
#[derive(Debug, Clone, PartialEq)]
pub struct EliminationUpdate {
    /// Game scope.
    pub game_id: GameId,
    /// The eliminated player.
    pub victim: Address,
    /// Why.
    pub reason: EliminationReason,
    /// Hunter credited, for combat kills.
    pub eliminated_by: Option<Address>,
    /// When.
    pub timestamp: UnixSeconds,
    /// Cycle change to apply atomically.
    pub rewire: RewireUpdate,
}

// ═══════════════════════════════════════════════════════════════════════════════
// GAME STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for game rows and shrink schedules.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Insert a game row. Only called from a confirmed chain event or a
    /// rebuild read.
    async fn insert_game(&self, game: &Game) -> Result<()>;

    /// Fetch one game.
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>>;

    /// Apply a top-level phase transition with its associated fields.
    async fn update_game_phase(
        &self,
        game_id: GameId,
        phase: GamePhase,
        update: &PhaseUpdate,
    ) -> Result<()>;

    /// Move to a new sub-phase within ACTIVE.
    async fn update_sub_phase(
        &self,
        game_id: GameId,
        sub_phase: SubPhase,
        started_at: UnixSeconds,
    ) -> Result<()>;

    /// All games currently in a phase.
    async fn get_games_in_phase(&self, phase: GamePhase) -> Result<Vec<Game>>;

    /// Every game row.
    async fn get_all_games(&self) -> Result<Vec<Game>>;

    /// Update mirrored registration counters.
    async fn update_player_count(
        &self,
        game_id: GameId,
        player_count: u32,
        total_collected_wei: U256,
    ) -> Result<()>;

    /// Persist a game's shrink schedule.
    async fn insert_zone_shrinks(&self, game_id: GameId, schedule: &[ZoneShrink]) -> Result<()>;

    /// Load a game's shrink schedule in `at_second` order.
    async fn get_zone_shrinks(&self, game_id: GameId) -> Result<Vec<ZoneShrink>>;

    /// Wipe every game-scoped table. Used before a full rebuild from chain.
    async fn reset_game_data(&self) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for player rows.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Insert a registered player.
    async fn insert_player(&self, player: &Player) -> Result<()>;

    /// Fetch by address.
    async fn get_player(&self, game_id: GameId, address: Address) -> Result<Option<Player>>;

    /// Fetch by player number.
    async fn get_player_by_number(
        &self,
        game_id: GameId,
        number: PlayerNumber,
    ) -> Result<Option<Player>>;

    /// All players in leaderboard order (alive desc, kills desc, number asc).
    async fn get_players(&self, game_id: GameId) -> Result<Vec<Player>>;

    /// Alive players in number order.
    async fn get_alive_players(&self, game_id: GameId) -> Result<Vec<Player>>;

    /// Registered player count.
    async fn get_player_count(&self, game_id: GameId) -> Result<u32>;

    /// Alive player count.
    async fn get_alive_player_count(&self, game_id: GameId) -> Result<u32>;

    /// Checked-in player count.
    async fn get_checked_in_count(&self, game_id: GameId) -> Result<u32>;

    /// Mark a player eliminated and stamp the elimination sequence.
    ///
    /// No-op when already eliminated, preserving the at-most-once alive
    /// transition under replayed chain events.
    async fn eliminate_player(
        &self,
        game_id: GameId,
        address: Address,
        reason: EliminationReason,
        eliminated_by: Option<Address>,
        timestamp: UnixSeconds,
    ) -> Result<()>;

    /// Credit a verified kill to the hunter.
    async fn increment_player_kills(&self, game_id: GameId, address: Address) -> Result<()>;

    /// Mark checked in (monotone) and record the Bluetooth identifier.
    async fn set_player_checked_in(
        &self,
        game_id: GameId,
        address: Address,
        bluetooth_id: Option<&str>,
    ) -> Result<()>;

    /// Mirror the chain's claim flag.
    async fn set_player_claimed(&self, game_id: GameId, address: Address) -> Result<()>;

    /// Seed every alive player's heartbeat deadline at hunt start.
    async fn init_players_heartbeat(&self, game_id: GameId, timestamp: UnixSeconds) -> Result<()>;

    /// Refresh heartbeats for both sides of an accepted scan.
    async fn update_last_heartbeat(
        &self,
        game_id: GameId,
        addresses: &[Address],
        timestamp: UnixSeconds,
    ) -> Result<()>;

    /// Alive players whose last heartbeat is older than `interval`.
    async fn get_heartbeat_expired_players(
        &self,
        game_id: GameId,
        now: UnixSeconds,
        interval_secs: i64,
    ) -> Result<Vec<Player>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TARGET STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the persisted hunter→target cycle. All operations are scoped by
/// game.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Replace the game's assignments with a full cycle, in one transaction.
    async fn set_target_assignments(
        &self,
        game_id: GameId,
        assignments: &[(Address, Address)],
    ) -> Result<()>;

    /// Upsert one hunter's assignment.
    async fn set_target_assignment(
        &self,
        game_id: GameId,
        hunter: Address,
        target: Address,
    ) -> Result<()>;

    /// A hunter's current target.
    async fn get_target_assignment(
        &self,
        game_id: GameId,
        hunter: Address,
    ) -> Result<Option<Address>>;

    /// Remove one hunter's assignment.
    async fn remove_target_assignment(&self, game_id: GameId, hunter: Address) -> Result<()>;

    /// Reverse lookup: who hunts `target`.
    async fn find_hunter_of(&self, game_id: GameId, target: Address) -> Result<Option<Address>>;

    /// Every assignment of the game, for recovery.
    async fn get_target_assignments(&self, game_id: GameId) -> Result<Vec<TargetAssignment>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// KILL / LOCATION / HEARTBEAT / PHOTO STORES
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for kill rows.
#[async_trait]
pub trait KillStore: Send + Sync {
    /// Insert a verified kill.
    async fn insert_kill(&self, kill: &Kill) -> Result<()>;

    /// Attach the confirmed transaction hash to a kill row.
    async fn update_kill_tx_hash(
        &self,
        game_id: GameId,
        hunter: Address,
        target: Address,
        tx_hash: &str,
    ) -> Result<()>;

    /// All kills of a game in time order.
    async fn get_kills(&self, game_id: GameId) -> Result<Vec<Kill>>;
}

/// Port for location pings. Only the latest ping per player matters; older
/// rows may be pruned.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Record a ping.
    async fn insert_location_ping(&self, ping: &LocationPing) -> Result<()>;

    /// Latest ping for one player.
    async fn get_latest_location_ping(
        &self,
        game_id: GameId,
        address: Address,
    ) -> Result<Option<LocationPing>>;

    /// Latest ping per player for the whole game, for the tick sweep.
    async fn get_latest_location_pings(&self, game_id: GameId) -> Result<Vec<LocationPing>>;

    /// Drop pings older than the cutoff.
    async fn prune_location_pings(&self, game_id: GameId, before: UnixSeconds) -> Result<u64>;
}

/// Port for heartbeat-scan audit rows.
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Record an accepted scan.
    async fn insert_heartbeat_scan(&self, scan: &HeartbeatScan) -> Result<()>;
}

/// Port for kill-proof photo metadata.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Record a photo's metadata.
    async fn insert_game_photo(&self, photo: &GamePhoto) -> Result<()>;

    /// All photos of a game.
    async fn get_game_photos(&self, game_id: GameId) -> Result<Vec<GamePhoto>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR TX & SYNC STORES
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the persisted operator transaction log.
#[async_trait]
pub trait OperatorTxStore: Send + Sync {
    /// Append a pending entry; returns its row id.
    async fn insert_operator_tx(
        &self,
        game_id: Option<GameId>,
        action: &str,
        params: &str,
        created_at: UnixSeconds,
    ) -> Result<i64>;

    /// Advance an entry's status.
    async fn update_operator_tx(
        &self,
        id: i64,
        status: OperatorTxStatus,
        tx_hash: Option<&str>,
        last_error: Option<&str>,
        confirmed_at: Option<UnixSeconds>,
    ) -> Result<()>;

    /// All entries in a status, oldest first.
    async fn get_operator_txs_in_status(&self, status: OperatorTxStatus) -> Result<Vec<OperatorTx>>;
}

/// Port for the listener's sync state.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Load the cursor, `None` on first run.
    async fn get_sync_cursor(&self) -> Result<Option<SyncCursor>>;

    /// Persist the cursor.
    async fn set_sync_cursor(&self, cursor: &SyncCursor) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATOMIC TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the multi-row transitions that must not be observable
/// half-applied.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Commit a combat kill: insert the kill row, increment the hunter's
    /// kills, eliminate the target, and rewire the cycle - one transaction.
    async fn commit_kill(&self, kill: &Kill, elimination: &EliminationUpdate) -> Result<()>;

    /// Commit a non-combat elimination with its rewiring - one transaction.
    async fn commit_elimination(&self, elimination: &EliminationUpdate) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPOSITE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// The full persistence contract the engine depends on.
pub trait Store:
    GameStore
    + PlayerStore
    + TargetStore
    + KillStore
    + LocationStore
    + HeartbeatStore
    + PhotoStore
    + OperatorTxStore
    + SyncStore
    + AtomicStore
{
}

impl<T> Store for T where
    T: GameStore
        + PlayerStore
        + TargetStore
        + KillStore
        + LocationStore
        + HeartbeatStore
        + PhotoStore
        + OperatorTxStore
        + SyncStore
        + AtomicStore
{
}
