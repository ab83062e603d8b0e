//! Feed access: fetching documents, parsing their items, and turning a
//! matched item into a [`FeedItem`].
//!
//! - [`document`] - RSS body → ordered [`ItemNode`]s with raw text and a field map
//! - [`fetcher`] - the [`FeedClient`] seam and its HTTP implementation
//! - [`item`] - [`ContentHash`] and the typed [`FeedItem`] record

mod document;
mod fetcher;
mod item;

pub use document::{parse_document, FeedDocument, FieldValue, ItemFields, ItemNode, ParseError};
pub use fetcher::{FeedClient, FetchError, HttpFeedClient};
pub use item::{ContentHash, FeedItem};
