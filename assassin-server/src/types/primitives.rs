//! Validated primitive types for domain entities.
//!
//! These newtypes provide:
//! - Type safety (a player number is not a game id)
//! - Domain semantics in function signatures
//!
//! Wall-clock time in the domain is plain unix seconds ([`UnixSeconds`]);
//! chrono enters only at the store and logging boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix timestamp in whole seconds.
///
/// Signed so deadline arithmetic (`now - started_at`) cannot underflow.
pub type UnixSeconds = i64;

// ═══════════════════════════════════════════════════════════════════════════════
// GAME ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain-assigned game identifier, monotonic from `nextGameId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(u64);

impl GameId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GameId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYER NUMBER
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain-assigned player number, 1-based and stable for the game's lifetime.
///
/// This is the client-facing identifier in every server message; wallet
/// addresses appear only in auth and chain contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerNumber(u32);

impl PlayerNumber {
    /// Upper bound (exclusive) imposed by the QR payload encoding, which
    /// packs the player number into four decimal digits.
    pub const MAX: u32 = 10_000;

    /// Wrap a raw number.
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// The raw number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for PlayerNumber {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_id_serializes_transparently() {
        let id = GameId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(serde_json::from_str::<GameId>("42").unwrap(), id);
    }

    #[test]
    fn player_number_displays_with_hash() {
        assert_eq!(PlayerNumber::new(7).to_string(), "#7");
    }
}
