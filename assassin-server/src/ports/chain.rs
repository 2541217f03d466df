//! Typed contract-read port.
//!
//! Idempotent views of on-chain truth, already mapped into domain form
//! (fixed-point coordinates decoded, phase discriminants parsed). The RPC
//! reader implements this; tests script it.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::error::Result;
use crate::geo::GeoPoint;
use crate::types::entities::{PrizeSplit, Winners, ZoneShrink};
use crate::types::enums::GamePhase;
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

/// Immutable game parameters, fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainGameConfig {
    /// Display title.
    pub title: String,
    /// Creator address.
    pub creator: Address,
    /// Entry fee in wei.
    pub entry_fee_wei: U256,
    /// Base reward in wei.
    pub base_reward_wei: U256,
    /// Escrow allocation.
    pub split: PrizeSplit,
    /// Zone center, decoded from micro-degrees.
    pub zone_center: GeoPoint,
    /// Meeting point, decoded from micro-degrees.
    pub meeting_point: GeoPoint,
    /// Registration deadline.
    pub registration_deadline: UnixSeconds,
    /// Scheduled game date.
    pub game_date: UnixSeconds,
    /// Maximum active duration in seconds.
    pub max_duration_secs: i64,
    /// Minimum registrations.
    pub min_players: u32,
}

/// Mutable game state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainGameState {
    /// Authoritative phase.
    pub phase: GamePhase,
    /// Set once ACTIVE.
    pub started_at: Option<UnixSeconds>,
    /// Set once terminal.
    pub ended_at: Option<UnixSeconds>,
    /// Registration count.
    pub player_count: u32,
    /// Escrow collected in wei.
    pub total_collected_wei: U256,
    /// Winner tuple once ENDED.
    pub winners: Option<Winners>,
}

/// Per-player on-chain record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPlayer {
    /// Chain-assigned number.
    pub number: PlayerNumber,
    /// Alive flag as the contract sees it.
    pub is_alive: bool,
    /// Kill count as attested on-chain.
    pub kills: u32,
    /// Prize/refund claimed.
    pub has_claimed: bool,
}

/// Read-side port over the game contract.
#[async_trait]
pub trait GameChain: Send + Sync {
    /// The id the next created game will receive.
    async fn next_game_id(&self) -> Result<u64>;

    /// Read a game's immutable config.
    async fn game_config(&self, game_id: GameId) -> Result<ChainGameConfig>;

    /// Read a game's mutable state.
    async fn game_state(&self, game_id: GameId) -> Result<ChainGameState>;

    /// Read a game's shrink schedule.
    async fn zone_shrinks(&self, game_id: GameId) -> Result<Vec<ZoneShrink>>;

    /// Read a player record; `None` when the address never registered.
    async fn player(&self, game_id: GameId, address: Address) -> Result<Option<ChainPlayer>>;

    /// Enumerate a player by chain-assigned number; `None` past the
    /// registered count. Drives the rebuild-from-chain path.
    async fn player_by_number(
        &self,
        game_id: GameId,
        number: PlayerNumber,
    ) -> Result<Option<(Address, ChainPlayer)>>;

    /// Hash of the first block at or after the given timestamp.
    ///
    /// Used to seed the target permutation. `None` when the chain head is
    /// still before the timestamp or the lookup is unavailable.
    async fn seed_block_hash(&self, at_or_after: UnixSeconds) -> Result<Option<B256>>;
}
