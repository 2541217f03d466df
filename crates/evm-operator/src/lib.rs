//! Chain access for a single operator identity.
//!
//! The game server submits every state-mutating transaction from exactly one
//! operator wallet. This crate provides the pieces that make that safe:
//!
//! - [`OperatorProvider`] - an alloy HTTP provider with the operator wallet
//!   attached, plus receipt polling and pending-nonce queries
//! - [`NonceCell`] - serialized nonce tracking for that one identity, with
//!   resync after a nonce race
//! - [`ProviderError`] - error taxonomy with nonce-race / revert / transient
//!   classification, so callers can decide between retry and fail
//!
//! # Example
//!
//! ```ignore
//! use evm_operator::{NonceCell, OperatorProvider};
//!
//! let provider = OperatorProvider::connect(rpc_url, operator_key, chain_id).await?;
//! let nonces = NonceCell::new();
//!
//! let nonce = nonces.reserve(&provider).await?;
//! // build + send the transaction with this nonce ...
//! // on a nonce race: nonces.resync(&provider).await?; and retry
//! ```

pub mod error;
pub mod nonce;
pub mod provider;

pub use error::{ProviderError, Result};
pub use nonce::NonceCell;
pub use provider::{NonceSource, OperatorProvider};
