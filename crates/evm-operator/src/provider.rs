//! Operator-wallet provider built on alloy's HTTP transport.
//!
//! [`OperatorProvider`] binds the operator's local signer to an alloy
//! provider so contract call builders can be signed and sent directly. It
//! deliberately exposes only what the game server needs: the erased provider
//! for `sol!` bindings, pending-nonce queries, and receipt polling with a
//! bounded deadline.

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, TransactionReceipt};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, Result};

/// Interval between receipt polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-request deadline for RPC calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ═══════════════════════════════════════════════════════════════════════════════
// NONCE SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the operator's pending nonce.
///
/// Split out as a trait so [`NonceCell`](crate::NonceCell) can be exercised
/// against a mock in tests.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// The operator's next nonce including mempool transactions.
    async fn pending_nonce(&self) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Alloy provider with the operator wallet attached.
///
/// Cloning is cheap; all clones share the underlying transport.
#[derive(Debug, Clone)]
pub struct OperatorProvider {
    /// Type-erased alloy provider (wallet filler included).
    provider: DynProvider,
    /// The operator's address, derived from the configured key.
    operator: Address,
    /// Cached chain ID for fast access.
    chain_id: u64,
}

impl OperatorProvider {
    /// Connect to the RPC endpoint and attach the operator wallet.
    ///
    /// Verifies the remote chain ID against `expected_chain_id` so a
    /// misconfigured endpoint fails at startup rather than at first submit.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfig`] for a malformed key, URL, or
    /// chain-id mismatch, and [`ProviderError::Connection`] when the endpoint
    /// is unreachable.
    pub async fn connect(rpc_url: &str, private_key: &str, expected_chain_id: u64) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| ProviderError::InvalidConfig(format!("invalid operator key: {e}")))?;
        let operator = signer.address();

        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ProviderError::InvalidConfig(format!("invalid RPC URL: {e}")))?;

        // Every RPC call gets a bounded deadline via the HTTP client.
        let client = alloy::transports::http::reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Connection(format!("failed to build HTTP client: {e}")))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_reqwest(client, url)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ProviderError::Connection(format!("failed to get chain ID: {e}")))?;

        if expected_chain_id != 0 && chain_id != expected_chain_id {
            return Err(ProviderError::InvalidConfig(format!(
                "chain ID mismatch: endpoint reports {chain_id}, configured {expected_chain_id}"
            )));
        }

        debug!(chain_id, %operator, rpc_url, "Connected as operator");

        Ok(Self {
            provider,
            operator,
            chain_id,
        })
    }

    /// The operator's address.
    #[must_use]
    pub const fn operator(&self) -> Address {
        self.operator
    }

    /// Chain identifier reported by the endpoint.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The underlying alloy provider, for `sol!` contract bindings.
    #[must_use]
    pub const fn inner(&self) -> &DynProvider {
        &self.provider
    }

    /// Wait for a transaction to be confirmed, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ReceiptNotFound`] when the deadline passes
    /// without the transaction being mined.
    #[instrument(skip(self), fields(chain_id = self.chain_id))]
    pub async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TransactionReceipt> {
        let start = std::time::Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(ProviderError::ReceiptNotFound(tx_hash));
            }

            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
                Err(e) => {
                    warn!(%tx_hash, error = %e, "Error fetching receipt, will retry");
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl NonceSource for OperatorProvider {
    #[instrument(skip(self), fields(operator = %self.operator))]
    async fn pending_nonce(&self) -> Result<u64> {
        self.provider
            .get_transaction_count(self.operator)
            .block_id(BlockNumberOrTag::Pending.into())
            .await
            .map_err(ProviderError::from)
    }
}
