//! Durable storage of matched items and their evidence.
//!
//! The [`Store`] trait is the narrow interface the persistence consumer writes
//! through; [`SqliteStore`] implements it on four normalized tables:
//!
//! - `rss_items(sha256 PK, title, link, description, author, category,
//!   comments, enclosure, guid, pub_date, source)`
//! - `patterns(regex PK)`
//! - `matches(match PK)`
//! - `evidence(id, rss_item_sha256, match, pattern)`, unique on the triple
//!
//! Every write is insert-if-absent, so replaying an entry is harmless.
//! [`Evidence`] is the read-back form of one evidence row.

mod queries;
mod records;
mod schema;
mod types;

use async_trait::async_trait;

use crate::channel::MatchedItem;
use crate::feed::{ContentHash, FeedItem};

pub use schema::SqliteStore;
pub use types::{Evidence, StoreError, TableCounts, WriteSummary};

/// Idempotent write interface used by the persistence consumer.
///
/// Each method returns `true` when it added a row and `false` when the key
/// was already present.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert keyed by `content_hash`; no-op if present.
    async fn upsert_feed_item(&self, item: &FeedItem) -> Result<bool, StoreError>;

    /// Insert keyed by pattern text; no-op if present.
    async fn upsert_pattern(&self, text: &str) -> Result<bool, StoreError>;

    /// Insert keyed by the matched substring; no-op if present.
    async fn upsert_match(&self, value: &str) -> Result<bool, StoreError>;

    /// Insert keyed by the (item, match, pattern) triple; no-op if present.
    async fn insert_evidence_if_absent(
        &self,
        content_hash: &ContentHash,
        match_value: &str,
        pattern_text: &str,
    ) -> Result<bool, StoreError>;

    /// Write the item, its patterns, matches and evidence for one entry.
    ///
    /// This is the call the persistence consumer makes. The default runs the
    /// four operations above in order; [`SqliteStore`] runs the same
    /// statements inside one transaction so an entry lands whole or not at all.
    async fn record(&self, entry: &MatchedItem) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary {
            item_inserted: self.upsert_feed_item(&entry.item).await?,
            ..WriteSummary::default()
        };

        for pattern_match in &entry.matches {
            let pattern = &*pattern_match.pattern;
            if self.upsert_pattern(pattern).await? {
                summary.patterns_inserted += 1;
            }
            for value in &pattern_match.matches {
                if self.upsert_match(value).await? {
                    summary.matches_inserted += 1;
                }
                if self
                    .insert_evidence_if_absent(&entry.item.content_hash, value, pattern)
                    .await?
                {
                    summary.evidence_inserted += 1;
                }
            }
        }
        Ok(summary)
    }
}
