//! Error types for operator chain access.
//!
//! The queue worker keys its retry policy off this taxonomy:
//!
//! - [`ProviderError::NonceRace`] - resync the nonce and retry (bounded)
//! - [`ProviderError::Reverted`] - final, the contract rejected the call
//! - transient network errors ([`is_retryable`](ProviderError::is_retryable)) -
//!   back off and retry without touching the nonce

use std::time::Duration;

use alloy::primitives::TxHash;
use thiserror::Error;

/// Result type alias using [`ProviderError`].
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur when talking to the chain as the operator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Failed to establish connection to the RPC endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// JSON-RPC error returned by the server.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable error message from the server.
        message: String,
    },

    /// The submitted nonce lost a race: already used or expired.
    ///
    /// Recoverable - resync from the chain's pending nonce and retry.
    #[error("nonce race: {0}")]
    NonceRace(String),

    /// The contract reverted the call. Final, never retried.
    #[error("reverted by contract: {0}")]
    Reverted(String),

    /// Transaction receipt not found after waiting.
    #[error("transaction {0} not found after waiting")]
    ReceiptNotFound(TxHash),

    /// Failed to encode or decode call data.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Response was valid JSON-RPC but had unexpected structure.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration (bad URL, malformed key, chain-id mismatch).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic provider error wrapping underlying implementation errors.
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Create an RPC error from code and message.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Check if this is a nonce race that a resync-and-retry can fix.
    #[must_use]
    pub const fn is_nonce_error(&self) -> bool {
        matches!(self, Self::NonceRace(_))
    }

    /// Check if the contract itself rejected the call.
    #[must_use]
    pub const fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }

    /// Check if this error is likely transient and retryable.
    ///
    /// Returns `true` for network issues and timeouts that might succeed on
    /// retry with the same nonce.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Rpc { code, .. } => {
                // Server overloaded or rate limited
                *code == -32005 || *code == -32000
            }
            _ => false,
        }
    }

    /// Categorize a raw error message from the RPC layer.
    ///
    /// Alloy does not expose structured error kinds for node-side rejections,
    /// so classification is string-based on the messages Geth/Reth emit.
    #[must_use]
    pub fn from_message(msg: String) -> Self {
        let lower = msg.to_lowercase();

        if lower.contains("nonce too low")
            || lower.contains("nonce expired")
            || lower.contains("invalid nonce")
        {
            Self::NonceRace(msg)
        } else if lower.contains("execution reverted") || lower.contains("revert") {
            Self::Reverted(msg)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Connection(format!("request timed out: {msg}"))
        } else if lower.contains("connection") || lower.contains("connect") || lower.contains("refused")
        {
            Self::Connection(msg)
        } else {
            Self::Other(msg)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS FROM alloy ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<alloy::transports::TransportError> for ProviderError {
    fn from(err: alloy::transports::TransportError) -> Self {
        Self::from_message(err.to_string())
    }
}

impl From<alloy::contract::Error> for ProviderError {
    fn from(err: alloy::contract::Error) -> Self {
        Self::from_message(err.to_string())
    }
}

impl From<alloy::sol_types::Error> for ProviderError {
    fn from(err: alloy::sol_types::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
