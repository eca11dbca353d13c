//! In-memory snapshot store
//!
//! Holds the one snapshot currently served to readers. Writers build a new
//! [`Snapshot`] and swap the shared pointer; readers clone the pointer and
//! keep an immutable view that later swaps cannot touch.

use crate::types::{MarketRecord, Snapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store for the current market snapshot
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Creates a store holding an empty snapshot for `quote_currency`
    pub fn new(quote_currency: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty(quote_currency))),
        }
    }

    /// Atomically replaces the whole snapshot with `records`
    ///
    /// An empty `records` is legal and clears the store. Returns the
    /// snapshot that was installed.
    pub async fn replace(&self, records: Vec<MarketRecord>) -> Arc<Snapshot> {
        self.install(records, Utc::now()).await
    }

    /// Installs records loaded from durable storage
    pub async fn restore(
        &self,
        records: Vec<MarketRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<Snapshot> {
        self.install(records, fetched_at).await
    }

    async fn install(
        &self,
        records: Vec<MarketRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<Snapshot> {
        let mut current = self.current.write().await;
        let next = Arc::new(Snapshot {
            sequence: current.sequence + 1,
            fetched_at: Some(fetched_at),
            quote_currency: current.quote_currency.clone(),
            records,
        });
        *current = next.clone();

        tracing::debug!(
            sequence = next.sequence,
            count = next.len(),
            "Installed new snapshot"
        );

        next
    }

    /// Returns the current snapshot
    pub async fn read(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Returns an owned copy of the current records
    pub async fn records(&self) -> Vec<MarketRecord> {
        self.read().await.records.clone()
    }

    /// Checks if the snapshot is older than `threshold_secs` or was never filled
    pub async fn is_stale(&self, threshold_secs: u64) -> bool {
        self.read().await.is_stale(threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::record;

    #[tokio::test]
    async fn test_fresh_store_reads_empty() {
        let store = SnapshotStore::new("USD");
        let snapshot = store.read().await;

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.quote_currency, "USD");
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_snapshot() {
        let store = SnapshotStore::new("USD");
        store
            .replace(vec![record("BTC", 1.0), record("ETH", 2.0)])
            .await;
        let installed = store.replace(vec![record("SOL", 3.0)]).await;

        assert_eq!(installed.sequence, 2);
        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "SOL");
    }

    #[tokio::test]
    async fn test_replace_with_empty_clears_store() {
        let store = SnapshotStore::new("USD");
        store.replace(vec![record("BTC", 1.0)]).await;
        let cleared = store.replace(Vec::new()).await;

        assert!(cleared.is_empty());
        assert_eq!(cleared.sequence, 2);
        assert!(cleared.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_read_view_survives_later_replace() {
        let store = SnapshotStore::new("USD");
        store.replace(vec![record("BTC", 1.0)]).await;

        let before = store.read().await;
        store.replace(vec![record("ETH", 2.0)]).await;

        assert_eq!(before.records[0].symbol, "BTC");
        assert_eq!(store.read().await.records[0].symbol, "ETH");
    }

    #[tokio::test]
    async fn test_duplicate_symbols_are_kept_in_order() {
        let store = SnapshotStore::new("USD");
        store
            .replace(vec![record("DUP", 1.0), record("DUP", 2.0)])
            .await;

        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].price, 2.0);
    }

    #[tokio::test]
    async fn test_restore_keeps_stored_timestamp() {
        let store = SnapshotStore::new("USD");
        let fetched_at = Utc::now() - chrono::Duration::seconds(3600);
        let snapshot = store.restore(vec![record("BTC", 1.0)], fetched_at).await;

        assert_eq!(snapshot.fetched_at, Some(fetched_at));
        assert!(store.is_stale(60).await);
        assert!(!store.is_stale(7200).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_partial_snapshot() {
        const WIDTH: usize = 64;
        let store = Arc::new(SnapshotStore::new("USD"));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for generation in 1..=200u32 {
                    let records = (0..WIDTH)
                        .map(|i| record(&format!("A{}", i), generation as f64))
                        .collect();
                    store.replace(records).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = store.read().await;
                    if snapshot.is_empty() {
                        assert_eq!(snapshot.sequence, 0);
                        continue;
                    }
                    assert_eq!(snapshot.len(), WIDTH);
                    let generation = snapshot.records[0].price;
                    assert!(snapshot.records.iter().all(|r| r.price == generation));
                    assert_eq!(generation as u64, snapshot.sequence);
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_get_unique_sequences() {
        const WIDTH: usize = 16;
        const COMMITS: u64 = 100;
        let store = Arc::new(SnapshotStore::new("USD"));

        // each writer tags its records so a mixed snapshot is detectable
        let mut writers = Vec::new();
        for writer in ["A", "B"] {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                let mut sequences = Vec::new();
                for _ in 0..COMMITS {
                    let records = (0..WIDTH)
                        .map(|i| record(&format!("{}{}", writer, i), i as f64))
                        .collect();
                    let installed = store.replace(records).await;
                    assert!(installed
                        .records
                        .iter()
                        .all(|r| r.symbol.starts_with(writer)));
                    sequences.push(installed.sequence);
                    tokio::task::yield_now().await;
                }
                sequences
            }));
        }

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..500 {
                    let snapshot = store.read().await;
                    assert!(snapshot.sequence >= last);
                    last = snapshot.sequence;
                    if let Some(first) = snapshot.records.first() {
                        let tag = &first.symbol[..1];
                        assert_eq!(snapshot.len(), WIDTH);
                        assert!(snapshot.records.iter().all(|r| r.symbol.starts_with(tag)));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut sequences = Vec::new();
        for writer in writers {
            sequences.extend(writer.await.unwrap());
        }
        reader.await.unwrap();

        sequences.sort_unstable();
        assert_eq!(sequences, (1..=2 * COMMITS).collect::<Vec<_>>());
        assert_eq!(store.read().await.sequence, 2 * COMMITS);
    }
}
