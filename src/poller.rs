//! Feed Poller: one per configured feed.
//!
//! Each cycle fetches the feed, skips items whose content hash was already
//! evaluated, runs the patterns over the rest, and queues every item with at
//! least one match onto the Result Channel in document order. Cycles repeat
//! every `interval` until shutdown or a fatal error.
//!
//! # Failure handling
//!
//! - Transient fetch errors (network, timeout, 429, 5xx, truncated body) are
//!   retried with exponential backoff inside the cycle
//! - Once retries are exhausted, or on a permanent error (other 4xx), the
//!   poller stops and reports [`PollerExit::Failed`]
//! - A document that cannot be parsed only skips that cycle
//! - A closed Result Channel means the consumer is gone; the poller stops

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::channel::{MatchedItem, ResultSender};
use crate::dedup::SeenFilter;
use crate::feed::{ContentHash, FeedClient, FeedDocument, FeedItem, FetchError, ParseError};
use crate::matcher::PatternSet;
use crate::shutdown::ShutdownSignal;

/// Exponential backoff for fetch retries within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = fail on the first error)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-indexed): 2s, 4s, 8s, ... with the
    /// default policy, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// LRU bound for the dedup filter; `None` remembers every item
    pub dedup_capacity: Option<NonZeroUsize>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            dedup_capacity: None,
        }
    }
}

/// Why a poll cycle did not complete.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("Malformed feed document: {0}")]
    Malformed(#[from] ParseError),
    #[error("Result channel closed")]
    ChannelClosed,
}

impl PollError {
    /// Whether the poller must stop. A malformed document only costs one cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PollError::Malformed(_))
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Items in the fetched document
    pub items: usize,
    /// Items not seen in earlier cycles
    pub new_items: usize,
    /// Items queued for persistence
    pub enqueued: usize,
}

/// How a poller's run ended.
#[derive(Debug)]
pub enum PollerExit {
    /// Shutdown was requested
    Stopped,
    /// A fatal error ended ingestion for this feed
    Failed(PollError),
    /// The poller task panicked
    Panicked(String),
}

impl PollerExit {
    pub fn is_failure(&self) -> bool {
        !matches!(self, PollerExit::Stopped)
    }
}

impl fmt::Display for PollerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollerExit::Stopped => f.write_str("stopped"),
            PollerExit::Failed(e) => write!(f, "failed: {e}"),
            PollerExit::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

pub struct FeedPoller<C> {
    url: String,
    client: C,
    patterns: Arc<PatternSet>,
    seen: SeenFilter,
    results: ResultSender,
    settings: PollerSettings,
}

impl<C: FeedClient> FeedPoller<C> {
    pub fn new(
        url: impl Into<String>,
        client: C,
        patterns: Arc<PatternSet>,
        results: ResultSender,
        settings: PollerSettings,
    ) -> Self {
        Self {
            url: url.into(),
            client,
            patterns,
            seen: SeenFilter::new(settings.dedup_capacity),
            results,
            settings,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Poll until shutdown or a fatal error.
    ///
    /// Consumes the poller; its client and its sender half of the Result
    /// Channel are dropped on return.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> PollerExit {
        tracing::info!(
            feed = %self.url,
            interval_secs = self.settings.interval.as_secs(),
            "Poller started"
        );

        let exit = loop {
            if shutdown.is_triggered() {
                break PollerExit::Stopped;
            }

            match self.poll_once(&mut shutdown).await {
                Ok(Some(stats)) => {
                    tracing::debug!(
                        feed = %self.url,
                        items = stats.items,
                        new_items = stats.new_items,
                        enqueued = stats.enqueued,
                        "Poll cycle complete"
                    );
                }
                Ok(None) => break PollerExit::Stopped,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(feed = %self.url, error = %e, "Skipping poll cycle");
                }
                Err(e) => {
                    tracing::error!(feed = %self.url, error = %e, "Poller giving up on feed");
                    break PollerExit::Failed(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = shutdown.triggered() => break PollerExit::Stopped,
            }
        };

        tracing::info!(feed = %self.url, seen = self.seen.len(), "Poller stopped");
        exit
    }

    /// Run a single cycle. Returns `Ok(None)` when shutdown interrupted a
    /// retry backoff.
    pub async fn poll_once(
        &mut self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<CycleStats>, PollError> {
        match self.fetch_document(shutdown).await? {
            Some(document) => self.process_document(&document).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_document(
        &self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<FeedDocument>, PollError> {
        let retry_policy = self.settings.retry;
        let mut retry = 0;

        loop {
            match self.client.fetch(&self.url).await {
                Ok(document) => return Ok(Some(document)),
                Err(FetchError::Parse(e)) => return Err(PollError::Malformed(e)),
                Err(e) if e.is_retryable() && retry < retry_policy.max_retries => {
                    let delay = retry_policy.delay_for(retry);
                    tracing::warn!(
                        feed = %self.url,
                        error = %e,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying after delay"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.triggered() => return Ok(None),
                    }
                    retry += 1;
                }
                Err(source) => {
                    return Err(PollError::Fetch {
                        attempts: retry + 1,
                        source,
                    })
                }
            }
        }
    }

    /// Dedup, match and enqueue the items of one document, in document order.
    ///
    /// Every unseen item is marked seen whether or not it matches, so an item
    /// that never matches is evaluated exactly once.
    pub async fn process_document(
        &mut self,
        document: &FeedDocument,
    ) -> Result<CycleStats, PollError> {
        let mut stats = CycleStats {
            items: document.items().len(),
            ..CycleStats::default()
        };

        for node in document.items() {
            let hash = ContentHash::of(node.raw_text());
            if self.seen.seen(&hash) {
                continue;
            }
            self.seen.mark_seen(hash.clone());
            stats.new_items += 1;

            let matches = self.patterns.find_matches(node.raw_text());
            if matches.is_empty() {
                continue;
            }

            let item = FeedItem::from_node(hash, node, &self.url);
            tracing::debug!(
                feed = %self.url,
                hash = %item.content_hash,
                patterns = matches.len(),
                "Item matched"
            );

            self.results
                .send(MatchedItem { item, matches })
                .await
                .map_err(|_| PollError::ChannelClosed)?;
            stats.enqueued += 1;
        }

        Ok(stats)
    }
}
