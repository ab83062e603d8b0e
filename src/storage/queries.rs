use super::schema::SqliteStore;
use super::types::{Evidence, FeedItemRow, StoreError, TableCounts};
use crate::feed::{ContentHash, FeedItem};

impl SqliteStore {
    /// Stored item with the given hash, if any.
    pub async fn get_feed_item(&self, hash: &ContentHash) -> Result<Option<FeedItem>, StoreError> {
        let row: Option<FeedItemRow> = sqlx::query_as(
            r#"
            SELECT sha256, title, link, description, author, category,
                   comments, enclosure, guid, pub_date, source
            FROM rss_items
            WHERE sha256 = ?
        "#,
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(FeedItemRow::into_item).transpose()
    }

    /// Evidence rows recorded for an item, in insertion order.
    pub async fn evidence_for_item(&self, hash: &ContentHash) -> Result<Vec<Evidence>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT "match", pattern
            FROM evidence
            WHERE rss_item_sha256 = ?
            ORDER BY id
        "#,
        )
        .bind(hash.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(match_value, pattern)| Evidence {
                content_hash: hash.clone(),
                match_value,
                pattern,
            })
            .collect())
    }

    /// Row counts of all four tables.
    pub async fn counts(&self) -> Result<TableCounts, StoreError> {
        let (items, patterns, matches, evidence): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM rss_items),
                (SELECT COUNT(*) FROM patterns),
                (SELECT COUNT(*) FROM matches),
                (SELECT COUNT(*) FROM evidence)
        "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(TableCounts {
            items,
            patterns,
            matches,
            evidence,
        })
    }
}
