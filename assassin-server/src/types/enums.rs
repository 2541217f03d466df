//! Closed enumerations shared across the server.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// GAME PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level game phase. Authoritative on-chain; the server mirrors it.
///
/// Phase is monotone: a game never regresses to an earlier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GamePhase {
    /// Players may register on-chain.
    Registration,
    /// The game is live; sub-phase refines this.
    Active,
    /// Finished with winners attested on-chain.
    Ended,
    /// Aborted; registered players claim refunds from the contract.
    Cancelled,
}

/// An unknown phase discriminant from the chain.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid game phase: {0}")]
pub struct InvalidPhase(pub u8);

impl GamePhase {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "REGISTRATION",
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse the store's string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REGISTRATION" => Some(Self::Registration),
            "ACTIVE" => Some(Self::Active),
            "ENDED" => Some(Self::Ended),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Ordering rank for the monotonicity check (ENDED and CANCELLED are
    /// both terminal).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Registration => 0,
            Self::Active => 1,
            Self::Ended | Self::Cancelled => 2,
        }
    }

    /// Whether this phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }
}

impl TryFrom<u8> for GamePhase {
    type Error = InvalidPhase;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Registration),
            1 => Ok(Self::Active),
            2 => Ok(Self::Ended),
            3 => Ok(Self::Cancelled),
            other => Err(InvalidPhase(other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUB-PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Server-side refinement of the ACTIVE phase.
///
/// Non-null iff phase = ACTIVE; advisory (never written on-chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubPhase {
    /// Players prove physical presence at the meeting point.
    Checkin,
    /// Countdown before targets are revealed.
    Pregame,
    /// The hunt is on.
    Game,
}

impl SubPhase {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::Pregame => "pregame",
            Self::Game => "game",
        }
    }

    /// Parse the store's string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checkin" => Some(Self::Checkin),
            "pregame" => Some(Self::Pregame),
            "game" => Some(Self::Game),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELIMINATION REASON
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a player left the alive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    /// Eliminated by their hunter with a verified kill.
    Killed,
    /// Stayed outside the play zone past the grace period.
    ZoneViolation,
    /// Missed the heartbeat scan deadline.
    HeartbeatTimeout,
}

impl EliminationReason {
    /// Stable string form used in the store and in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Killed => "killed",
            Self::ZoneViolation => "zone_violation",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }

    /// Parse the store's string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "killed" => Some(Self::Killed),
            "zone_violation" => Some(Self::ZoneViolation),
            "heartbeat_timeout" => Some(Self::HeartbeatTimeout),
            _ => None,
        }
    }

    /// Discriminant used by the contract's `eliminatePlayer(reason)`.
    #[must_use]
    pub const fn chain_code(self) -> u8 {
        match self {
            Self::Killed => 0,
            Self::ZoneViolation => 1,
            Self::HeartbeatTimeout => 2,
        }
    }

    /// Decode the contract discriminant.
    #[must_use]
    pub const fn from_chain_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Killed),
            1 => Some(Self::ZoneViolation),
            2 => Some(Self::HeartbeatTimeout),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR TX STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of an operator queue entry.
///
/// Transitions: pending → submitted → confirmed | failed. Entries never move
/// backwards; a restart re-reads pending/submitted rows and reconciles them
/// against chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorTxStatus {
    /// Written to the log, not yet sent.
    Pending,
    /// Sent to the chain, waiting for the receipt.
    Submitted,
    /// Receipt observed with success status.
    Confirmed,
    /// Rejected, reverted, or abandoned after retries.
    Failed,
}

impl OperatorTxStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    /// Parse the store's string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
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
    fn phase_round_trips_through_store_form() {
        for phase in [
            GamePhase::Registration,
            GamePhase::Active,
            GamePhase::Ended,
            GamePhase::Cancelled,
        ] {
            assert_eq!(GamePhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(GamePhase::parse("bogus"), None);
    }

    #[test]
    fn phase_rank_is_monotone_along_transitions() {
        assert!(GamePhase::Registration.rank() < GamePhase::Active.rank());
        assert!(GamePhase::Active.rank() < GamePhase::Ended.rank());
        assert_eq!(GamePhase::Ended.rank(), GamePhase::Cancelled.rank());
    }

    #[test]
    fn chain_phase_discriminants_decode() {
        assert_eq!(GamePhase::try_from(0), Ok(GamePhase::Registration));
        assert_eq!(GamePhase::try_from(3), Ok(GamePhase::Cancelled));
        assert_eq!(GamePhase::try_from(9), Err(InvalidPhase(9)));
    }

    #[test]
    fn elimination_reason_chain_codes_round_trip() {
        for reason in [
            EliminationReason::Killed,
            EliminationReason::ZoneViolation,
            EliminationReason::HeartbeatTimeout,
        ] {
            assert_eq!(
                EliminationReason::from_chain_code(reason.chain_code()),
                Some(reason)
            );
        }
    }

    #[test]
    fn sub_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubPhase::Checkin).unwrap(),
            "\"checkin\""
        );
    }
}
