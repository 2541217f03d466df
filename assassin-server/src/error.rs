//! Layered error types for the game server.
//!
//! - [`ValidationError`] - the caller's fault; surfaces verbatim as a
//!   structured code (kill pipeline, check-in, scans)
//! - [`AuthError`] - signature and message-freshness failures
//! - [`StateError`] - the request was well-formed but the world disagrees
//! - [`ChainError`] - RPC and contract failures; mostly absorbed by the
//!   operator queue
//! - [`StoreError`] - persistence failures; corruption is fatal
//! - [`ServerError`] - the umbrella used throughout application code
//!
//! Validation and auth errors are recoverable and user-facing; chain errors
//! are retried or logged; a corrupted store terminates the process with a
//! distinct exit code.

use thiserror::Error;

use crate::geo::InvalidCoordinate;

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, ServerError>;

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// A player action failed verification. Always the caller's fault.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// QR payload failed to decode or belongs to another game.
    #[error("invalid QR payload")]
    InvalidQr,

    /// Distance check failed.
    #[error("out of range: {distance_meters:.1} m exceeds {max_meters:.1} m")]
    OutOfRange {
        /// Measured distance.
        distance_meters: f64,
        /// Allowed maximum.
        max_meters: f64,
    },

    /// The scanned player is not the hunter's current assignment.
    #[error("scanned player is not your target")]
    NotYourTarget,

    /// No player with the decoded number in this game.
    #[error("target not found")]
    TargetNotFound,

    /// Target already eliminated.
    #[error("target is not alive")]
    TargetNotAlive,

    /// The submitting hunter is eliminated.
    #[error("hunter is not alive")]
    HunterNotAlive,

    /// Game is not in sub-phase `game`.
    #[error("game is not active")]
    GameNotActive,

    /// BLE required but the target's identifier was not seen nearby.
    #[error("target not present in BLE scan")]
    BlePresenceMissing,

    /// Target has no location ping to check distance against.
    #[error("target has no known position")]
    NoTargetPosition,

    /// Coordinate outside ±90/±180.
    #[error(transparent)]
    BadCoordinate(#[from] InvalidCoordinate),

    /// Action requires the caller to be checked in.
    #[error("not checked in")]
    NotCheckedIn,
}

impl ValidationError {
    /// Stable code surfaced to the caller.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidQr => "INVALID_QR",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::NotYourTarget => "NOT_YOUR_TARGET",
            Self::TargetNotFound => "TARGET_NOT_FOUND",
            Self::TargetNotAlive => "TARGET_NOT_ALIVE",
            Self::HunterNotAlive => "HUNTER_NOT_ALIVE",
            Self::GameNotActive => "GAME_NOT_ACTIVE",
            Self::BlePresenceMissing => "BLE_PRESENCE_MISSING",
            Self::NoTargetPosition => "NO_TARGET_POSITION",
            Self::BadCoordinate(_) => "BAD_COORDINATE",
            Self::NotCheckedIn => "NOT_CHECKED_IN",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTH ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Signature or auth-message failure.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Signature malformed or recovery failed.
    #[error("invalid signature")]
    SignatureInvalid,

    /// Signed message older than the freshness window.
    #[error("auth message stale: {age_seconds} s old")]
    MessageStale {
        /// Message age at validation time.
        age_seconds: i64,
    },

    /// Signed message names a different game.
    #[error("auth message is for game {got}, expected {expected}")]
    WrongGame {
        /// Game the caller addressed.
        expected: u64,
        /// Game named in the message.
        got: u64,
    },
}

impl AuthError {
    /// Stable code surfaced to the caller.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::MessageStale { .. } => "MESSAGE_STALE",
            Self::WrongGame { .. } => "WRONG_GAME",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// The request was well-formed but current state forbids it.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    /// Entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation requires a different phase or sub-phase.
    #[error("phase mismatch: expected {expected}, found {actual}")]
    PhaseMismatch {
        /// Required phase.
        expected: String,
        /// Observed phase.
        actual: String,
    },

    /// Check-in repeated.
    #[error("already checked in")]
    AlreadyCheckedIn,

    /// Elimination repeated.
    #[error("already eliminated")]
    AlreadyEliminated,
}

impl StateError {
    /// Stable code surfaced to the caller.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::PhaseMismatch { .. } => "PHASE_MISMATCH",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::AlreadyEliminated => "ALREADY_ELIMINATED",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN & STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain-side failure observed by the reader, writer, or queue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// Nonce race; the queue resyncs and retries internally.
    #[error("nonce race: {0}")]
    NonceRace(String),

    /// Contract rejected the call. Final.
    #[error("reverted by contract: {0}")]
    RevertedByContract(String),

    /// Endpoint unreachable; retried with backoff.
    #[error("RPC unavailable: {0}")]
    RpcUnavailable(String),

    /// Any other provider failure.
    #[error(transparent)]
    Provider(evm_operator::ProviderError),

    /// Chain data failed to decode into domain form.
    #[error("chain data invalid: {0}")]
    InvalidData(String),
}

impl From<evm_operator::ProviderError> for ChainError {
    fn from(err: evm_operator::ProviderError) -> Self {
        use evm_operator::ProviderError as P;
        match err {
            P::NonceRace(msg) => Self::NonceRace(msg),
            P::Reverted(msg) => Self::RevertedByContract(msg),
            P::Connection(msg) => Self::RpcUnavailable(msg),
            P::Timeout(d) => Self::RpcUnavailable(format!("timed out after {d:?}")),
            other => Self::Provider(other),
        }
    }
}

/// Persistence failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Row not found where one was required.
    #[error("row not found")]
    NotFound,

    /// Uniqueness or foreign-key violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database corruption or schema drift. Fatal.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Underlying driver error.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
                Self::ConstraintViolation(db.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UMBRELLA
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level error combining all layers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Caller's fault; surfaces verbatim.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Signature/auth failure; surfaces verbatim.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// State conflict; 4xx-equivalent.
    #[error(transparent)]
    State(#[from] StateError),

    /// Chain failure; mostly absorbed by the queue.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bad or missing configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Startup wiring failure. Fatal.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// The event subscription went quiet past the stale window; self-heals
    /// by restarting the subscription.
    #[error("event listener stalled")]
    ListenerStalled,
}

impl ServerError {
    /// Stable code for the transport layer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Chain(_) => "CHAIN_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Initialization(_) => "INIT_ERROR",
            Self::ListenerStalled => "LISTENER_STALLED",
        }
    }

    /// Process exit code for fatal conditions, `None` when recoverable.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Config(_) => Some(2),
            Self::Store(StoreError::Corrupted(_)) => Some(3),
            Self::Initialization(_) => Some(4),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<evm_operator::ProviderError> for ServerError {
    fn from(err: evm_operator::ProviderError) -> Self {
        Self::Chain(err.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
