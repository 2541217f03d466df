//! Typed chain access for the game contract.
//!
//! - [`OperatorCall`] - the closed set of state-mutating calls the operator
//!   can make; serialized into the operator log
//! - [`reader`] - idempotent typed views implementing the
//!   [`GameChain`](crate::ports::chain::GameChain) port
//! - [`writer`] - builds and sends operator transactions; consulted by the
//!   queue for startup reconciliation

pub mod reader;
pub mod writer;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::types::entities::NewGame;
use crate::types::enums::EliminationReason;
use crate::types::primitives::GameId;

pub use reader::ChainReader;
pub use writer::ChainWriter;

/// One state-mutating contract call from the operator identity.
///
/// The whole enum is serialized as the operator-log `params` column, so a
/// restart can rebuild the exact call from the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorCall {
    /// Create a new game from the given parameters.
    CreateGame {
        /// Game parameters and shrink schedule.
        params: Box<NewGame>,
    },
    /// Move a REGISTRATION game to ACTIVE.
    StartGame {
        /// Target game.
        game_id: GameId,
    },
    /// Attest a verified kill.
    RecordKill {
        /// Target game.
        game_id: GameId,
        /// The hunter.
        hunter: Address,
        /// The eliminated target.
        target: Address,
    },
    /// Attest a non-combat elimination.
    EliminatePlayer {
        /// Target game.
        game_id: GameId,
        /// The eliminated player.
        player: Address,
        /// Why.
        reason: EliminationReason,
    },
    /// End the game with the winner tuple.
    EndGame {
        /// Target game.
        game_id: GameId,
        /// First place.
        first: Address,
        /// Second place, when the podium filled.
        second: Option<Address>,
        /// Third place, when the podium filled.
        third: Option<Address>,
        /// Most kills.
        top_killer: Address,
    },
    /// Cancel a game that missed its minimum registration.
    TriggerCancellation {
        /// Target game.
        game_id: GameId,
    },
    /// Cancel a game past its expiry deadline.
    TriggerExpiry {
        /// Target game.
        game_id: GameId,
    },
    /// Withdraw accumulated creator fees.
    WithdrawCreatorFees {
        /// Target game.
        game_id: GameId,
    },
    /// Withdraw accumulated platform fees.
    WithdrawPlatformFees,
}

impl OperatorCall {
    /// Action discriminant for the operator log.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::CreateGame { .. } => "create_game",
            Self::StartGame { .. } => "start_game",
            Self::RecordKill { .. } => "record_kill",
            Self::EliminatePlayer { .. } => "eliminate_player",
            Self::EndGame { .. } => "end_game",
            Self::TriggerCancellation { .. } => "trigger_cancellation",
            Self::TriggerExpiry { .. } => "trigger_expiry",
            Self::WithdrawCreatorFees { .. } => "withdraw_creator_fees",
            Self::WithdrawPlatformFees => "withdraw_platform_fees",
        }
    }

    /// The game this call is scoped to, when any.
    #[must_use]
    pub const fn game_id(&self) -> Option<GameId> {
        match self {
            Self::StartGame { game_id }
            | Self::RecordKill { game_id, .. }
            | Self::EliminatePlayer { game_id, .. }
            | Self::EndGame { game_id, .. }
            | Self::TriggerCancellation { game_id }
            | Self::TriggerExpiry { game_id }
            | Self::WithdrawCreatorFees { game_id } => Some(*game_id),
            Self::CreateGame { .. } | Self::WithdrawPlatformFees => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_round_trips_through_log_params() {
        let call = OperatorCall::RecordKill {
            game_id: GameId::new(4),
            hunter: Address::repeat_byte(0x01),
            target: Address::repeat_byte(0x02),
        };
        let params = serde_json::to_string(&call).unwrap();
        let restored: OperatorCall = serde_json::from_str(&params).unwrap();
        assert_eq!(restored, call);
        assert_eq!(call.action(), "record_kill");
        assert_eq!(call.game_id(), Some(GameId::new(4)));
    }

    #[test]
    fn platform_withdraw_has_no_game_scope() {
        assert_eq!(OperatorCall::WithdrawPlatformFees.game_id(), None);
    }
}
