use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite-backed store holding `rss_items`, `patterns`, `matches` and `evidence`.
///
/// Cloning is cheap (shared pool). The pool closes when the last clone drops.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database lock,
    /// `StoreError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Set via pragma() so every pooled
        // connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Writes come from a single consumer; extra connections only serve reads.
        // An in-memory database lives in its connection, so it gets exactly one.
        // It must also never be reaped for idleness or age.
        let in_memory = path == ":memory:";
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .acquire_timeout(Duration::from_secs(10));
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(|e| match StoreError::from_sqlx(e) {
            StoreError::Other(inner) => StoreError::Migration(inner.to_string()),
            other => other,
        })?;

        tracing::info!(path = %path, "Store opened");
        Ok(store)
    }

    /// Create the schema atomically within a transaction.
    ///
    /// Every statement is `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op. Databases created before the evidence uniqueness
    /// rule existed gain it through the unique index.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rss_items (
                sha256 VARCHAR PRIMARY KEY,
                title VARCHAR,
                link VARCHAR,
                description VARCHAR,
                author VARCHAR,
                category VARCHAR,
                comments VARCHAR,
                enclosure VARCHAR,
                guid VARCHAR,
                pub_date VARCHAR,
                source VARCHAR
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                regex VARCHAR PRIMARY KEY
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                "match" VARCHAR PRIMARY KEY
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS evidence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rss_item_sha256 VARCHAR NOT NULL,
                "match" VARCHAR NOT NULL,
                pattern VARCHAR NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Databases written without the index may hold repeated triples; keep
        // the earliest row of each before the index can be created
        let has_index: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_evidence_triple'",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if has_index.is_none() {
            let removed = sqlx::query(
                r#"
                DELETE FROM evidence
                WHERE id NOT IN (
                    SELECT MIN(id) FROM evidence
                    GROUP BY rss_item_sha256, "match", pattern
                )
            "#,
            )
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if removed > 0 {
                tracing::warn!(removed, "Removed duplicate evidence rows");
            }
        }

        // One row per (item, match, pattern) triple; also serves lookups by item
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_evidence_triple
            ON evidence(rss_item_sha256, "match", pattern)
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
