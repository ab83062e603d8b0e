use thiserror::Error;

use crate::feed::{ContentHash, FeedItem};

// ============================================================================
// Error Types
// ============================================================================

/// Store errors with user-facing messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds a lock on the database
    #[error("Database is locked by another process")]
    Locked,

    /// Schema creation or upgrade failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row cannot be mapped back to a record
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`StoreError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Write Results
// ============================================================================

/// One evidence row: this pattern matched this substring in this item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Evidence {
    pub content_hash: ContentHash,
    pub match_value: String,
    pub pattern: String,
}

/// What one [`record`](super::Store::record) call actually added.
///
/// Zero everywhere means the entry was already fully stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub item_inserted: bool,
    pub patterns_inserted: usize,
    pub matches_inserted: usize,
    pub evidence_inserted: usize,
}

impl WriteSummary {
    pub fn is_noop(&self) -> bool {
        *self == WriteSummary::default()
    }
}

/// Row counts of the four tables
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub items: i64,
    pub patterns: i64,
    pub matches: i64,
    pub evidence: i64,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for `rss_items` queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedItemRow {
    pub sha256: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub comments: Option<String>,
    pub enclosure: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    pub source: Option<String>,
}

impl FeedItemRow {
    pub(crate) fn into_item(self) -> Result<FeedItem, StoreError> {
        let content_hash =
            ContentHash::from_hex(self.sha256.as_str()).ok_or_else(|| StoreError::Corrupt {
                table: "rss_items",
                reason: format!("invalid sha256 {:?}", self.sha256),
            })?;

        Ok(FeedItem {
            content_hash,
            title: self.title,
            link: self.link,
            description: self.description,
            author: self.author,
            category: self.category,
            comments: self.comments,
            enclosure: self.enclosure,
            guid: self.guid,
            published_at: self.pub_date,
            source_url: self.source,
        })
    }
}
