//! Polls RSS feeds, matches each new item's text against regex patterns, and
//! records matching items with their evidence in SQLite.
//!
//! Data flow: [`poller::FeedPoller`] (one per feed) → [`channel`] →
//! [`consumer::PersistenceConsumer`] → [`storage::Store`]. The
//! [`pipeline`] module wires them together.

pub mod channel;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod feed;
pub mod matcher;
pub mod pipeline;
pub mod poller;
pub mod shutdown;
pub mod storage;
