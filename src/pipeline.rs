//! Orchestrator: wires pollers, the Result Channel and the consumer together.
//!
//! One poller task per feed URL, one consumer task. Shutdown ordering:
//!
//! 1. The stop signal reaches every poller; each finishes its current step
//!    and exits, dropping its channel sender. A consumer that ends in error
//!    raises the same stop
//! 2. The orchestrator drops its own sender once all pollers have returned
//! 3. The consumer drains whatever is still queued and returns
//!
//! Every entry enqueued before shutdown is therefore persisted.

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::channel::result_channel;
use crate::consumer::{ConsumerStats, PersistenceConsumer};
use crate::feed::{FeedClient, FetchError};
use crate::matcher::PatternSet;
use crate::poller::{FeedPoller, PollError, PollerExit, PollerSettings};
use crate::shutdown::{shutdown_channel, ShutdownSignal};
use crate::storage::{Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub poller: PollerSettings,
    /// Result Channel bound; `None` means unbounded
    pub channel_capacity: Option<usize>,
}

/// Why the consumer did not finish draining the channel.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Consumer task panicked: {0}")]
    Panicked(String),
}

/// How one feed's poller ended.
#[derive(Debug)]
pub struct PollerReport {
    pub url: String,
    pub exit: PollerExit,
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// One entry per configured URL, in configuration order
    pub pollers: Vec<PollerReport>,
    pub consumer: Result<ConsumerStats, ConsumerError>,
}

impl PipelineReport {
    /// Whether any poller failed or the consumer aborted.
    pub fn has_failures(&self) -> bool {
        self.consumer.is_err() || self.pollers.iter().any(|p| p.exit.is_failure())
    }

    pub fn failed_feeds(&self) -> impl Iterator<Item = &PollerReport> {
        self.pollers.iter().filter(|p| p.exit.is_failure())
    }
}

/// Run pollers for `urls` and the persistence consumer until shutdown.
///
/// `connect` builds each poller's own client. A URL whose client cannot be
/// built is reported as failed without stopping the other feeds.
///
/// Returns after every poller has exited and the consumer has drained the
/// channel: on shutdown, when the consumer fails, or when every poller has
/// failed.
pub async fn run_pipeline<C, S, F>(
    urls: Vec<String>,
    patterns: Arc<PatternSet>,
    store: S,
    settings: PipelineSettings,
    mut connect: F,
    shutdown: ShutdownSignal,
) -> PipelineReport
where
    C: FeedClient + 'static,
    S: Store + 'static,
    F: FnMut(&str) -> Result<C, FetchError> + Send,
{
    let (results_tx, results_rx) = result_channel(settings.channel_capacity);

    // Pollers listen to an internal stop raised by either the caller's signal
    // or the consumer ending in error
    let (stop, poller_shutdown) = shutdown_channel();
    let stop = Arc::new(stop);

    let forward_stop = {
        let stop = Arc::clone(&stop);
        let mut external = shutdown;
        tokio::spawn(async move {
            external.triggered().await;
            stop.trigger();
        })
    };

    let consumer = {
        let stop = Arc::clone(&stop);
        let inner = tokio::spawn(PersistenceConsumer::new(store, results_rx).run());
        tokio::spawn(async move {
            let result = match inner.await {
                Ok(result) => result.map_err(ConsumerError::Store),
                Err(e) => Err(ConsumerError::Panicked(e.to_string())),
            };
            if let Err(e) = &result {
                tracing::error!(error = %e, "Consumer failed, stopping pollers");
                stop.trigger();
            }
            result
        })
    };

    let mut pollers: Vec<(String, Result<JoinHandle<PollerExit>, PollError>)> =
        Vec::with_capacity(urls.len());
    for url in urls {
        let handle = match connect(&url) {
            Ok(client) => {
                let poller = FeedPoller::new(
                    url.clone(),
                    client,
                    Arc::clone(&patterns),
                    results_tx.clone(),
                    settings.poller.clone(),
                );
                Ok(tokio::spawn(poller.run(poller_shutdown.clone())))
            }
            Err(source) => {
                tracing::error!(feed = %url, error = %source, "Failed to create feed client");
                Err(PollError::Fetch {
                    attempts: 0,
                    source,
                })
            }
        };
        pollers.push((url, handle));
    }
    tracing::info!(
        feeds = pollers.len(),
        patterns = patterns.len(),
        "Pipeline started"
    );

    let mut reports = Vec::with_capacity(pollers.len());
    for (url, handle) in pollers {
        let exit = match handle {
            Ok(handle) => match handle.await {
                Ok(exit) => exit,
                Err(e) => {
                    tracing::error!(feed = %url, error = %e, "Poller task panicked");
                    PollerExit::Panicked(e.to_string())
                }
            },
            Err(e) => PollerExit::Failed(e),
        };
        reports.push(PollerReport { url, exit });
    }

    // Last sender: the consumer sees end-of-stream once the queue is empty
    drop(results_tx);

    let consumer = match consumer.await {
        Ok(result) => result,
        Err(e) => Err(ConsumerError::Panicked(e.to_string())),
    };
    forward_stop.abort();

    tracing::info!(
        failed_feeds = reports.iter().filter(|r| r.exit.is_failure()).count(),
        consumer_ok = consumer.is_ok(),
        "Pipeline stopped"
    );

    PipelineReport {
        pollers: reports,
        consumer,
    }
}
