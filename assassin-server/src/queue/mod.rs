//! Serialized operator transaction queue.
//!
//! All state-mutating chain calls flow through one worker task that owns the
//! operator's nonce cell. The contract this queue enforces:
//!
//! - **FIFO, single writer.** Entries commit in channel order; nothing is
//!   submitted out of order.
//! - **Logged before submitted.** [`OperatorQueue::enqueue`] persists the
//!   entry as `pending` before it ever reaches the worker, so a crash loses
//!   nothing.
//! - **Nonce safety.** Nonce races resync and retry up to a small bound;
//!   transient RPC failures pause the queue with backoff; reverts fail the
//!   entry finally.
//! - **At-most-once effect.** On startup the worker reconciles pending and
//!   submitted entries against chain state before any resubmission.
//!
//! Producers fire and forget: the game tick records effects in the store
//! first and never waits on chain I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use evm_operator::NonceCell;

use crate::chain::{ChainWriter, OperatorCall};
use crate::error::Result;
use crate::ports::store::Store;
use crate::types::enums::OperatorTxStatus;

/// Bounded nonce-race retries per entry.
const MAX_NONCE_RETRIES: u32 = 6;

/// How long the worker waits for a receipt before leaving the entry in
/// `submitted` for restart reconciliation.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial backoff for transient RPC failures.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff ceiling while the RPC endpoint is unavailable.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One queued submission: the persisted log row plus the call to make.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Operator-log row id.
    pub id: i64,
    /// The call to submit.
    pub call: OperatorCall,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRODUCER HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Cheap cloneable handle for enqueueing operator calls.
#[derive(Clone)]
pub struct OperatorQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for OperatorQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorQueue").finish_non_exhaustive()
    }
}

impl OperatorQueue {
    /// Spawn the queue worker and return the producer handle.
    pub fn spawn(
        store: Arc<dyn Store>,
        writer: ChainWriter,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = QueueWorker {
            rx,
            store: Arc::clone(&store),
            writer,
            nonce: NonceCell::new(),
            shutdown,
        };
        let handle = tokio::spawn(worker.run());
        (Self { tx, store }, handle)
    }

    /// Create a queue with no worker; entries pile up in the returned
    /// receiver. Used by tests to observe what the engine enqueues.
    #[must_use]
    pub fn detached(store: Arc<dyn Store>) -> (Self, mpsc::UnboundedReceiver<QueueEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, store }, rx)
    }

    /// Log and enqueue one call. Fire-and-forget from the caller's
    /// perspective: the chain reflection happens asynchronously.
    ///
    /// # Errors
    ///
    /// Returns a store error when the log write fails; the entry is not
    /// enqueued in that case.
    #[instrument(skip(self, call), fields(action = call.action()))]
    pub async fn enqueue(&self, call: OperatorCall) -> Result<i64> {
        let params = serde_json::to_string(&call)
            .map_err(|e| crate::error::ServerError::Initialization(e.to_string()))?;
        let id = self
            .store
            .insert_operator_tx(
                call.game_id(),
                call.action(),
                &params,
                chrono::Utc::now().timestamp(),
            )
            .await?;

        if self.tx.send(QueueEntry { id, call }).is_err() {
            // Worker gone (shutdown); the pending row is reconciled on the
            // next start.
            warn!(id, "Operator queue worker not running; entry left pending");
        }
        Ok(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKER
// ═══════════════════════════════════════════════════════════════════════════════

struct QueueWorker {
    rx: mpsc::UnboundedReceiver<QueueEntry>,
    store: Arc<dyn Store>,
    writer: ChainWriter,
    nonce: NonceCell,
    shutdown: CancellationToken,
}

impl QueueWorker {
    async fn run(mut self) {
        if let Err(e) = self.reconcile_startup().await {
            error!(error = %e, "Operator queue startup reconciliation failed");
        }

        info!("Operator queue worker running");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Operator queue worker stopping");
                    return;
                }
                entry = self.rx.recv() => {
                    let Some(entry) = entry else { return };
                    self.process(entry).await;
                }
            }
        }
    }

    /// Reconcile entries left over from a previous run.
    ///
    /// For each pending or submitted entry, in log order: if the intended
    /// state change already landed, mark the entry confirmed; otherwise
    /// resubmit it.
    async fn reconcile_startup(&mut self) -> Result<()> {
        let mut entries = Vec::new();
        for status in [OperatorTxStatus::Submitted, OperatorTxStatus::Pending] {
            entries.extend(self.store.get_operator_txs_in_status(status).await?);
        }
        entries.sort_by_key(|e| e.id);

        for row in entries {
            let call: OperatorCall = match serde_json::from_str(&row.params) {
                Ok(call) => call,
                Err(e) => {
                    warn!(id = row.id, error = %e, "Unparseable operator log entry; failing it");
                    self.store
                        .update_operator_tx(
                            row.id,
                            OperatorTxStatus::Failed,
                            None,
                            Some("unparseable params"),
                            None,
                        )
                        .await?;
                    continue;
                }
            };

            match self.writer.is_applied(&call).await {
                Ok(true) => {
                    info!(id = row.id, action = call.action(), "Entry already applied on-chain");
                    self.store
                        .update_operator_tx(
                            row.id,
                            OperatorTxStatus::Confirmed,
                            None,
                            None,
                            Some(chrono::Utc::now().timestamp()),
                        )
                        .await?;
                }
                Ok(false) => {
                    info!(id = row.id, action = call.action(), "Resubmitting recovered entry");
                    self.process(QueueEntry { id: row.id, call }).await;
                }
                Err(e) => {
                    warn!(id = row.id, error = %e, "Reconciliation read failed; resubmitting");
                    self.process(QueueEntry { id: row.id, call }).await;
                }
            }
        }
        Ok(())
    }

    /// Submit one entry to completion: confirmed, failed, or left submitted
    /// when the receipt never arrived.
    #[instrument(skip(self, entry), fields(id = entry.id, action = entry.call.action()))]
    async fn process(&mut self, entry: QueueEntry) {
        let provider = self.writer.provider().clone();
        let mut nonce_retries = 0_u32;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let nonce = match self.nonce.reserve(&provider).await {
                Ok(nonce) => nonce,
                Err(e) => {
                    warn!(error = %e, "Nonce fetch failed; backing off");
                    if !self.pause(&mut backoff).await {
                        return;
                    }
                    continue;
                }
            };

            match self.writer.submit(&entry.call, nonce).await {
                Ok(tx_hash) => {
                    let hash = format!("{tx_hash:#x}");
                    self.set_status(entry.id, OperatorTxStatus::Submitted, Some(&hash), None)
                        .await;

                    match provider.wait_for_receipt(tx_hash, RECEIPT_TIMEOUT).await {
                        Ok(receipt) if receipt.status() => {
                            debug!(%tx_hash, "Operator transaction confirmed");
                            self.set_status(entry.id, OperatorTxStatus::Confirmed, None, None)
                                .await;
                            self.note_kill_hash(&entry.call, &hash).await;
                        }
                        Ok(_) => {
                            warn!(%tx_hash, "Operator transaction reverted on-chain");
                            self.set_status(
                                entry.id,
                                OperatorTxStatus::Failed,
                                None,
                                Some("reverted on-chain"),
                            )
                            .await;
                        }
                        Err(e) => {
                            // Leave submitted; restart reconciliation settles it.
                            warn!(%tx_hash, error = %e, "Receipt not observed in time");
                        }
                    }
                    return;
                }
                Err(e) if e.is_nonce_error() => {
                    nonce_retries += 1;
                    if nonce_retries > MAX_NONCE_RETRIES {
                        error!(error = %e, "Nonce races exhausted retries");
                        self.set_status(
                            entry.id,
                            OperatorTxStatus::Failed,
                            None,
                            Some(&e.to_string()),
                        )
                        .await;
                        return;
                    }
                    warn!(attempt = nonce_retries, error = %e, "Nonce race; resyncing");
                    let _ = self.nonce.resync(&provider).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "RPC unavailable; queue paused");
                    // The reserved nonce was never accepted; refetch.
                    let _ = self.nonce.resync(&provider).await;
                    if !self.pause(&mut backoff).await {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Operator transaction failed");
                    self.set_status(entry.id, OperatorTxStatus::Failed, None, Some(&e.to_string()))
                        .await;
                    let _ = self.nonce.resync(&provider).await;
                    return;
                }
            }
        }
    }

    /// Shutdown-aware backoff sleep. Returns `false` when shutting down.
    async fn pause(&self, backoff: &mut Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = tokio::time::sleep(*backoff) => {
                *backoff = (*backoff * 2).min(MAX_BACKOFF);
                true
            }
        }
    }

    async fn set_status(
        &self,
        id: i64,
        status: OperatorTxStatus,
        tx_hash: Option<&str>,
        last_error: Option<&str>,
    ) {
        let confirmed_at =
            (status == OperatorTxStatus::Confirmed).then(|| chrono::Utc::now().timestamp());
        if let Err(e) = self
            .store
            .update_operator_tx(id, status, tx_hash, last_error, confirmed_at)
            .await
        {
            error!(id, error = %e, "Failed to update operator log entry");
        }
    }

    /// Mirror the confirmed hash onto the kill row the tick created.
    async fn note_kill_hash(&self, call: &OperatorCall, hash: &str) {
        if let OperatorCall::RecordKill {
            game_id,
            hunter,
            target,
        } = call
            && let Err(e) = self
                .store
                .update_kill_tx_hash(*game_id, *hunter, *target, hash)
                .await
        {
            warn!(error = %e, "Failed to attach tx hash to kill row");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::ports::store::OperatorTxStore;
    use crate::store::SqliteStore;
    use crate::types::primitives::GameId;

    #[tokio::test]
    async fn enqueue_logs_before_sending() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (queue, mut rx) = OperatorQueue::detached(Arc::clone(&store) as Arc<dyn Store>);

        let call = OperatorCall::RecordKill {
            game_id: GameId::new(1),
            hunter: Address::repeat_byte(0x01),
            target: Address::repeat_byte(0x02),
        };
        let id = queue.enqueue(call.clone()).await.unwrap();

        let pending = store
            .get_operator_txs_in_status(OperatorTxStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].action, "record_kill");
        assert_eq!(pending[0].game_id, Some(GameId::new(1)));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, id);
        assert_eq!(received.call, call);
    }

    #[tokio::test]
    async fn entries_flow_fifo() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (queue, mut rx) = OperatorQueue::detached(Arc::clone(&store) as Arc<dyn Store>);

        for n in 1..=3_u64 {
            queue
                .enqueue(OperatorCall::StartGame {
                    game_id: GameId::new(n),
                })
                .await
                .unwrap();
        }

        for n in 1..=3_u64 {
            let entry = rx.recv().await.unwrap();
            assert_eq!(
                entry.call,
                OperatorCall::StartGame {
                    game_id: GameId::new(n)
                }
            );
        }
    }

    #[tokio::test]
    async fn log_params_restore_the_call() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (queue, _rx) = OperatorQueue::detached(Arc::clone(&store) as Arc<dyn Store>);

        let call = OperatorCall::EndGame {
            game_id: GameId::new(9),
            first: Address::repeat_byte(0x0A),
            second: None,
            third: None,
            top_killer: Address::repeat_byte(0x0A),
        };
        queue.enqueue(call.clone()).await.unwrap();

        let rows = store
            .get_operator_txs_in_status(OperatorTxStatus::Pending)
            .await
            .unwrap();
        let restored: OperatorCall = serde_json::from_str(&rows[0].params).unwrap();
        assert_eq!(restored, call);
    }
}
