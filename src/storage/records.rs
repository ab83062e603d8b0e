use async_trait::async_trait;
use sqlx::SqliteConnection;

use super::schema::SqliteStore;
use super::types::{StoreError, WriteSummary};
use super::Store;
use crate::channel::MatchedItem;
use crate::feed::{ContentHash, FeedItem};

// ============================================================================
// Insert-if-absent statements
// ============================================================================
//
// Each helper runs on a bare connection so the same statement serves both a
// standalone write (pooled connection) and a write inside a transaction.
// `rows_affected() > 0` tells whether the row is new.

async fn insert_feed_item(conn: &mut SqliteConnection, item: &FeedItem) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO rss_items
            (sha256, title, link, description, author, category,
             comments, enclosure, guid, pub_date, source)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(item.content_hash.as_str())
    .bind(&item.title)
    .bind(&item.link)
    .bind(&item.description)
    .bind(&item.author)
    .bind(&item.category)
    .bind(&item.comments)
    .bind(&item.enclosure)
    .bind(&item.guid)
    .bind(&item.published_at)
    .bind(&item.source_url)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_pattern(conn: &mut SqliteConnection, text: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO patterns (regex) VALUES (?)")
        .bind(text)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_match(conn: &mut SqliteConnection, value: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"INSERT OR IGNORE INTO matches ("match") VALUES (?)"#)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_evidence(
    conn: &mut SqliteConnection,
    content_hash: &ContentHash,
    match_value: &str,
    pattern_text: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO evidence (rss_item_sha256, "match", pattern)
        VALUES (?, ?, ?)
    "#,
    )
    .bind(content_hash.as_str())
    .bind(match_value)
    .bind(pattern_text)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_feed_item(&self, item: &FeedItem) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        insert_feed_item(&mut conn, item)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn upsert_pattern(&self, text: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        insert_pattern(&mut conn, text)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn upsert_match(&self, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        insert_match(&mut conn, value)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn insert_evidence_if_absent(
        &self,
        content_hash: &ContentHash,
        match_value: &str,
        pattern_text: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        insert_evidence(&mut conn, content_hash, match_value, pattern_text)
            .await
            .map_err(StoreError::from_sqlx)
    }

    /// All writes for the entry share one transaction: either the whole entry
    /// lands or, on error, none of it does.
    async fn record(&self, entry: &MatchedItem) -> Result<WriteSummary, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let mut summary = WriteSummary {
            item_inserted: insert_feed_item(&mut tx, &entry.item)
                .await
                .map_err(StoreError::from_sqlx)?,
            ..WriteSummary::default()
        };

        let hash = &entry.item.content_hash;
        for pattern_match in &entry.matches {
            let pattern = &*pattern_match.pattern;
            if insert_pattern(&mut tx, pattern)
                .await
                .map_err(StoreError::from_sqlx)?
            {
                summary.patterns_inserted += 1;
            }

            for value in &pattern_match.matches {
                if insert_match(&mut tx, value)
                    .await
                    .map_err(StoreError::from_sqlx)?
                {
                    summary.matches_inserted += 1;
                }
                if insert_evidence(&mut tx, hash, value, pattern)
                    .await
                    .map_err(StoreError::from_sqlx)?
                {
                    summary.evidence_inserted += 1;
                }
            }
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(summary)
    }
}
