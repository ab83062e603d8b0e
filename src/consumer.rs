//! Persistence Consumer: the only writer to the store.
//!
//! Entries are taken off the Result Channel one at a time and written in
//! arrival order. The consumer runs until every sender is gone and the queue
//! is drained, so nothing a poller enqueued before exiting is lost.

use crate::channel::ResultReceiver;
use crate::storage::{Store, StoreError, WriteSummary};

/// Running totals over everything the consumer wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Entries received from the channel
    pub entries: usize,
    pub items_inserted: usize,
    pub patterns_inserted: usize,
    pub matches_inserted: usize,
    pub evidence_inserted: usize,
}

impl ConsumerStats {
    fn add(&mut self, summary: WriteSummary) {
        self.entries += 1;
        self.items_inserted += usize::from(summary.item_inserted);
        self.patterns_inserted += summary.patterns_inserted;
        self.matches_inserted += summary.matches_inserted;
        self.evidence_inserted += summary.evidence_inserted;
    }
}

pub struct PersistenceConsumer<S> {
    store: S,
    results: ResultReceiver,
}

impl<S: Store> PersistenceConsumer<S> {
    pub fn new(store: S, results: ResultReceiver) -> Self {
        Self { store, results }
    }

    /// Write entries until the channel closes.
    ///
    /// # Errors
    ///
    /// Stops at the first store error. The receiver is dropped with it, so
    /// pollers see a closed channel on their next send.
    pub async fn run(mut self) -> Result<ConsumerStats, StoreError> {
        tracing::info!("Consumer started");
        let mut stats = ConsumerStats::default();

        while let Some(entry) = self.results.recv().await {
            let summary = match self.store.record(&entry).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!(
                        hash = %entry.item.content_hash,
                        error = %e,
                        "Failed to persist entry"
                    );
                    return Err(e);
                }
            };

            tracing::debug!(
                hash = %entry.item.content_hash,
                new_item = summary.item_inserted,
                evidence = summary.evidence_inserted,
                queued = self.results.len(),
                "Entry persisted"
            );
            stats.add(summary);
        }

        tracing::info!(
            entries = stats.entries,
            items = stats.items_inserted,
            evidence = stats.evidence_inserted,
            "Consumer drained"
        );
        Ok(stats)
    }
}
