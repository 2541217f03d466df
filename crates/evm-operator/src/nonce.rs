//! Nonce tracking for the single operator identity.
//!
//! The queue worker submits strictly serially, but querying the chain before
//! every submission is slow and racy against our own in-flight transactions.
//! [`NonceCell`] tracks the next nonce locally: fetched from the chain on
//! first use, incremented on each reservation, and resynced after a nonce
//! race.
//!
//! Unlike a per-address nonce map, there is exactly one identity here - the
//! operator - so the cell is a single slot behind an async mutex.

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::provider::NonceSource;

/// Locally tracked nonce for the operator identity.
///
/// All operations take `&self`; concurrent reservations are serialized by the
/// internal lock and receive unique, increasing nonces.
#[derive(Debug, Default)]
pub struct NonceCell {
    next: Mutex<Option<u64>>,
}

impl NonceCell {
    /// Create an empty cell. The first reservation fetches from the chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Mutex::new(None),
        }
    }

    /// Reserve the next nonce, fetching from the chain on first use.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial pending-nonce query fails.
    pub async fn reserve<S: NonceSource>(&self, source: &S) -> Result<u64> {
        let mut slot = self.next.lock().await;

        let current = match *slot {
            Some(n) => n,
            None => {
                let n = source.pending_nonce().await?;
                debug!(nonce = n, "Initialized operator nonce from chain");
                n
            }
        };

        *slot = Some(current + 1);
        Ok(current)
    }

    /// Resync with the chain's pending nonce.
    ///
    /// Call after a nonce race or a failed submission: the local counter may
    /// be ahead of (or behind) what the chain will accept next.
    ///
    /// # Errors
    ///
    /// Returns an error when the pending-nonce query fails.
    pub async fn resync<S: NonceSource>(&self, source: &S) -> Result<u64> {
        let chain_nonce = source.pending_nonce().await?;
        let mut slot = self.next.lock().await;

        if let Some(local) = *slot
            && local != chain_nonce
        {
            warn!(
                local,
                chain_nonce, "Nonce resync - local counter differed from chain"
            );
        }

        *slot = Some(chain_nonce);
        Ok(chain_nonce)
    }

    /// Current local value without reserving, `None` before first use.
    pub async fn peek(&self) -> Option<u64> {
        *self.next.lock().await
    }

    /// Forget the local counter; the next reservation fetches fresh.
    pub async fn clear(&self) {
        *self.next.lock().await = None;
        debug!("Cleared operator nonce");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Mock source that tracks how often the chain was queried.
    struct MockSource {
        chain_nonce: AtomicU64,
        query_count: AtomicU64,
    }

    impl MockSource {
        fn new(initial: u64) -> Self {
            Self {
                chain_nonce: AtomicU64::new(initial),
                query_count: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl NonceSource for MockSource {
        async fn pending_nonce(&self) -> Result<u64> {
            self.query_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.chain_nonce.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn reserve_fetches_on_first_use_only() {
        let source = MockSource::new(5);
        let cell = NonceCell::new();

        assert_eq!(cell.reserve(&source).await.unwrap(), 5);
        assert_eq!(cell.reserve(&source).await.unwrap(), 6);
        assert_eq!(source.query_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resync_overwrites_local_counter() {
        let source = MockSource::new(10);
        let cell = NonceCell::new();

        assert_eq!(cell.reserve(&source).await.unwrap(), 10);

        // Chain moved on (a stuck tx was replaced elsewhere).
        source.chain_nonce.store(15, Ordering::SeqCst);
        cell.resync(&source).await.unwrap();

        assert_eq!(cell.reserve(&source).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let source = MockSource::new(0);
        let cell = NonceCell::new();

        let _ = cell.reserve(&source).await.unwrap();
        cell.clear().await;
        assert!(cell.peek().await.is_none());

        let _ = cell.reserve(&source).await.unwrap();
        assert_eq!(source.query_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_reservations_are_unique() {
        let source = Arc::new(MockSource::new(0));
        let cell = Arc::new(NonceCell::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let source = Arc::clone(&source);
                let cell = Arc::clone(&cell);
                tokio::spawn(async move { cell.reserve(source.as_ref()).await.unwrap() })
            })
            .collect();

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }

        nonces.sort_unstable();
        assert_eq!(nonces, (0..10).collect::<Vec<u64>>());
    }
}
