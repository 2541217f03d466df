//! Decoded contract events with their block metadata.
//!
//! The listener decodes raw logs into [`GameEvent`] and hands them to the
//! game manager in strict `(block number, log index)` order. Every reaction
//! in the manager must be idempotent: backfill can replay events the server
//! already produced locally.

use alloy::primitives::{Address, B256};

use crate::types::enums::EliminationReason;
use crate::types::primitives::{GameId, UnixSeconds};

/// Where an event came from on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetadata {
    /// Block containing the log.
    pub block_number: u64,
    /// Position within the block.
    pub log_index: u64,
    /// Transaction that emitted the log.
    pub tx_hash: B256,
    /// Block timestamp in unix seconds.
    pub block_timestamp: UnixSeconds,
}

/// A contract event in domain form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A new game exists on-chain; config is read back via the contract.
    GameCreated {
        /// The new game's id.
        game_id: GameId,
        /// Its creator.
        creator: Address,
    },
    /// A player registered and was assigned a number.
    PlayerRegistered {
        /// Game scope.
        game_id: GameId,
        /// The player's wallet.
        player: Address,
        /// Chain-assigned number.
        player_number: u32,
    },
    /// The game moved to ACTIVE.
    GameStarted {
        /// Game scope.
        game_id: GameId,
        /// Authoritative start time.
        started_at: UnixSeconds,
    },
    /// A kill the operator submitted was confirmed.
    KillRecorded {
        /// Game scope.
        game_id: GameId,
        /// The hunter.
        hunter: Address,
        /// The eliminated target.
        target: Address,
    },
    /// A non-combat elimination was confirmed.
    PlayerEliminated {
        /// Game scope.
        game_id: GameId,
        /// The eliminated player.
        player: Address,
        /// Reason discriminant from the contract.
        reason: Option<EliminationReason>,
    },
    /// The game ended with an attested winner tuple.
    GameEnded {
        /// Game scope.
        game_id: GameId,
        /// First place.
        first: Address,
        /// Second place (zero address when absent).
        second: Address,
        /// Third place (zero address when absent).
        third: Address,
        /// Most kills.
        top_killer: Address,
    },
    /// The game was cancelled or expired.
    GameCancelled {
        /// Game scope.
        game_id: GameId,
    },
}

impl GameEvent {
    /// The game this event belongs to.
    #[must_use]
    pub const fn game_id(&self) -> GameId {
        match self {
            Self::GameCreated { game_id, .. }
            | Self::PlayerRegistered { game_id, .. }
            | Self::GameStarted { game_id, .. }
            | Self::KillRecorded { game_id, .. }
            | Self::PlayerEliminated { game_id, .. }
            | Self::GameEnded { game_id, .. }
            | Self::GameCancelled { game_id } => *game_id,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GameCreated { .. } => "GameCreated",
            Self::PlayerRegistered { .. } => "PlayerRegistered",
            Self::GameStarted { .. } => "GameStarted",
            Self::KillRecorded { .. } => "KillRecorded",
            Self::PlayerEliminated { .. } => "PlayerEliminated",
            Self::GameEnded { .. } => "GameEnded",
            Self::GameCancelled { .. } => "GameCancelled",
        }
    }
}
