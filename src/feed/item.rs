use sha2::{Digest, Sha256};
use std::fmt;

use super::document::ItemNode;

/// Identity of a feed item: lowercase hex SHA-256 of its raw text.
///
/// Equal raw text always yields an equal hash, across calls and restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(raw_text: &str) -> Self {
        let digest = Sha256::digest(raw_text.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Rebuild a hash read back from storage.
    ///
    /// Returns `None` unless `hex` is 64 lowercase hex digits.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        let valid = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then_some(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A matched feed entry, ready to be persisted.
///
/// Every descriptive field is optional: feeds routinely omit most of them,
/// and an absent element is stored as NULL rather than an empty string.
/// `published_at` is kept verbatim; it is never parsed into a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub content_hash: ContentHash,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Single category text, or a JSON array when the item has several.
    pub category: Option<String>,
    pub comments: Option<String>,
    pub enclosure: Option<String>,
    pub guid: Option<String>,
    pub published_at: Option<String>,
    pub source_url: Option<String>,
}

impl FeedItem {
    /// Build an item from a node's field map.
    ///
    /// - `author` falls back to `dc:creator`
    /// - `category` keeps every value when repeated (see [`ItemFields::joined`](super::ItemFields::joined))
    /// - `source_url` falls back to `feed_url` when the item has no `<source>`
    pub fn from_node(content_hash: ContentHash, node: &ItemNode, feed_url: &str) -> Self {
        let fields = node.fields();
        let text = |name: &str| fields.scalar(name).map(str::to_string);

        Self {
            content_hash,
            title: text("title"),
            link: text("link"),
            description: text("description"),
            author: text("author").or_else(|| text("dc:creator")),
            category: fields.joined("category"),
            comments: text("comments"),
            enclosure: text("enclosure"),
            guid: text("guid"),
            published_at: text("pubDate"),
            source_url: text("source").or_else(|| Some(feed_url.to_string())),
        }
    }
}
