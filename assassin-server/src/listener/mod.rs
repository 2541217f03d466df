//! Chain-event listener: subscription, backfill, and self-healing.
//!
//! The listener is the only path by which on-chain truth enters the server.
//! Its lifecycle per session:
//!
//! 1. Connect the WebSocket provider and subscribe to the contract's logs.
//! 2. Backfill `[lastProcessedBlock + 1, latest]` in `(block, log index)`
//!    order, advancing the persisted cursor block by block.
//! 3. Drain the live subscription, with a watchdog that restarts the
//!    session when the provider goes quiet past the stale window.
//!
//! Every reaction is idempotent, so overlap between backfill and the live
//! stream (or a crash between cursor advances) only causes replays, never
//! loss.

pub mod rebuild;
pub mod router;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use evm_operator::ProviderError;

use crate::config::ListenerSettings;
use crate::error::{ChainError, Result, ServerError};
use crate::ports::store::SyncStore;
use crate::types::entities::SyncCursor;
use crate::types::events::{EventMetadata, GameEvent};
use crate::types::primitives::UnixSeconds;

/// Blocks per backfill batch.
const BACKFILL_BATCH_BLOCKS: u64 = 2_000;

/// Timeout for the connection attempt and watchdog probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Block-timestamp cache bound; cleared wholesale when exceeded.
const TIMESTAMP_CACHE_LIMIT: usize = 1_024;

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLER PORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Consumer of decoded chain events, in strict `(block, log index)` order.
///
/// Implementations must be idempotent under replay.
#[async_trait]
pub trait ChainEventHandler: Send + Sync {
    /// React to one confirmed event.
    async fn handle_event(&self, event: GameEvent, meta: EventMetadata) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LISTENER
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-lived listener task state.
pub struct EventListener {
    ws_url: String,
    contract: Address,
    store: Arc<dyn SyncStore>,
    handler: Arc<dyn ChainEventHandler>,
    settings: ListenerSettings,
    shutdown: CancellationToken,
    /// Last block fully processed (backfill) or last block seen completed
    /// (live stream).
    cursor: u64,
    timestamps: HashMap<u64, UnixSeconds>,
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("ws_url", &self.ws_url)
            .field("contract", &self.contract)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl EventListener {
    /// Create a listener for the contract at `contract`.
    pub fn new(
        ws_url: impl Into<String>,
        contract: Address,
        store: Arc<dyn SyncStore>,
        handler: Arc<dyn ChainEventHandler>,
        settings: ListenerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            contract,
            store,
            handler,
            settings,
            shutdown,
            cursor: 0,
            timestamps: HashMap::new(),
        }
    }

    /// Run until shutdown, restarting the subscription session on stalls
    /// and disconnects (respecting the restart cooldown).
    ///
    /// # Errors
    ///
    /// Only fatal setup failures (an unloadable cursor) abort the task.
    #[instrument(skip(self), fields(contract = %self.contract))]
    pub async fn run(mut self) -> Result<()> {
        self.load_cursor().await?;
        let cooldown = Duration::from_millis(self.settings.ws_restart_cooldown_ms);

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            match self.run_session().await {
                Ok(()) => {
                    info!("Listener stopped cleanly");
                    return Ok(());
                }
                Err(e) => {
                    if self.shutdown.is_cancelled() {
                        return Ok(());
                    }
                    warn!(error = %e, cooldown_ms = cooldown.as_millis() as u64, "Listener session ended; restarting");
                    tokio::select! {
                        () = self.shutdown.cancelled() => return Ok(()),
                        () = tokio::time::sleep(cooldown) => {}
                    }
                }
            }
        }
    }

    /// Load the persisted cursor, discarding it when the configured
    /// contract changed since it was written.
    async fn load_cursor(&mut self) -> Result<()> {
        let contract = format!("{:#x}", self.contract);
        match self.store.get_sync_cursor().await? {
            Some(cursor) if cursor.contract_address.eq_ignore_ascii_case(&contract) => {
                self.cursor = cursor.last_processed_block;
                info!(block = self.cursor, "Resuming from sync cursor");
            }
            Some(cursor) => {
                warn!(
                    stored = %cursor.contract_address,
                    configured = %contract,
                    "Contract address changed; discarding sync cursor"
                );
                self.cursor = 0;
            }
            None => {
                info!("No sync cursor; starting from genesis");
                self.cursor = 0;
            }
        }
        Ok(())
    }

    async fn persist_cursor(&self) -> Result<()> {
        self.store
            .set_sync_cursor(&SyncCursor {
                last_processed_block: self.cursor,
                contract_address: format!("{:#x}", self.contract),
            })
            .await
    }

    /// One subscription session: connect, subscribe, backfill, stream.
    async fn run_session(&mut self) -> Result<()> {
        let ws = WsConnect::new(&self.ws_url);
        let provider = timeout(PROBE_TIMEOUT, ProviderBuilder::default().connect_ws(ws))
            .await
            .map_err(|_| ChainError::RpcUnavailable("WebSocket connection timed out".into()))?
            .map_err(|e| ChainError::from(ProviderError::from_message(e.to_string())))?;

        // Subscribe before backfilling so nothing falls between them; the
        // cursor check below deduplicates the overlap.
        let live_filter = Filter::new().address(self.contract);
        let subscription = provider
            .subscribe_logs(&live_filter)
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;
        let mut stream = subscription.into_stream();

        self.backfill(&provider).await?;

        let mut watchdog = interval(Duration::from_millis(
            self.settings.ws_heartbeat_check_interval_ms,
        ));
        watchdog.tick().await; // The first tick fires immediately.
        let stale = Duration::from_millis(self.settings.ws_heartbeat_stale_ms);
        let mut last_activity = tokio::time::Instant::now();

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                log = stream.next() => {
                    let Some(log) = log else {
                        return Err(ChainError::RpcUnavailable("log subscription closed".into()).into());
                    };
                    last_activity = tokio::time::Instant::now();
                    self.process_live_log(&provider, &log).await?;
                }
                _ = watchdog.tick() => {
                    // A quiet chain is fine as long as the provider still
                    // answers; a dead socket is not.
                    match timeout(PROBE_TIMEOUT, provider.get_block_number()).await {
                        Ok(Ok(_)) => {
                            if last_activity.elapsed() >= stale {
                                debug!("No events within the stale window; provider healthy");
                                last_activity = tokio::time::Instant::now();
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(error = %e, "Watchdog probe failed");
                            return Err(ServerError::ListenerStalled);
                        }
                        Err(_) => {
                            warn!("Watchdog probe timed out");
                            return Err(ServerError::ListenerStalled);
                        }
                    }
                }
            }
        }
    }

    /// Replay `[cursor + 1, latest]` in bounded batches.
    async fn backfill<P: Provider>(&mut self, provider: &P) -> Result<()> {
        let latest = provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;
        if latest <= self.cursor {
            return Ok(());
        }

        info!(from = self.cursor + 1, to = latest, "Backfilling chain events");
        let mut from = self.cursor + 1;

        while from <= latest {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            let to = (from + BACKFILL_BATCH_BLOCKS - 1).min(latest);

            let filter = Filter::new()
                .address(self.contract)
                .from_block(from)
                .to_block(to);
            let mut logs = provider
                .get_logs(&filter)
                .await
                .map_err(|e| ChainError::from(ProviderError::from(e)))?;
            logs.sort_by_key(|log| (log.block_number, log.log_index));

            for log in &logs {
                self.dispatch(provider, log).await?;
            }

            self.cursor = to;
            self.persist_cursor().await?;
            from = to + 1;
        }
        Ok(())
    }

    /// Handle one live-stream log, advancing the cursor on block
    /// boundaries.
    async fn process_live_log<P: Provider>(&mut self, provider: &P, log: &Log) -> Result<()> {
        let Some(block) = log.block_number else {
            // Pending logs carry no block; ignore until mined.
            return Ok(());
        };
        if block <= self.cursor {
            // Already covered by backfill or an earlier replay.
            return Ok(());
        }

        self.dispatch(provider, log).await?;

        // A log from block N proves every block before N is complete.
        if block > self.cursor + 1 {
            self.cursor = block - 1;
            self.persist_cursor().await?;
        }
        Ok(())
    }

    /// Decode a log and hand it to the handler with full metadata.
    async fn dispatch<P: Provider>(&mut self, provider: &P, log: &Log) -> Result<()> {
        let Some(event) = router::decode_log(log)? else {
            return Ok(());
        };

        let block_number = log.block_number.unwrap_or_default();
        let meta = EventMetadata {
            block_number,
            log_index: log.log_index.unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
            block_timestamp: self.block_timestamp(provider, log, block_number).await,
        };

        debug!(event = event.name(), block = block_number, "Dispatching chain event");
        self.handler.handle_event(event, meta).await
    }

    async fn block_timestamp<P: Provider>(
        &mut self,
        provider: &P,
        log: &Log,
        block_number: u64,
    ) -> UnixSeconds {
        // Block timestamps fit i64.
        #[allow(clippy::cast_possible_wrap)]
        if let Some(ts) = log.block_timestamp {
            return ts as i64;
        }
        if let Some(&ts) = self.timestamps.get(&block_number) {
            return ts;
        }

        #[allow(clippy::cast_possible_wrap)]
        let ts = match provider
            .get_block_by_number(block_number.into())
            .await
        {
            Ok(Some(block)) => block.header.timestamp as i64,
            _ => {
                warn!(block = block_number, "Block timestamp unavailable; using wall clock");
                chrono::Utc::now().timestamp()
            }
        };

        if self.timestamps.len() >= TIMESTAMP_CACHE_LIMIT {
            self.timestamps.clear();
        }
        self.timestamps.insert(block_number, ts);
        ts
    }
}
