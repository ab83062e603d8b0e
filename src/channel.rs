//! Result Channel between pollers and the persistence consumer.
//!
//! Unbounded by default: a poller's send never waits, so a stalled store lets
//! the queue grow without limit. With a capacity, sends wait for room and
//! slow persistence throttles the pollers instead.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::feed::FeedItem;
use crate::matcher::PatternMatch;
use crate::storage::Evidence;

/// One matched item and every pattern that matched it, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedItem {
    pub item: FeedItem,
    pub matches: Vec<PatternMatch>,
}

impl MatchedItem {
    /// Evidence triples carried by this entry, in pattern then match order.
    /// A substring matched twice by the same pattern yields a repeated triple.
    pub fn evidence(&self) -> impl Iterator<Item = Evidence> + '_ {
        self.matches.iter().flat_map(move |entry| {
            entry.matches.iter().map(move |value| Evidence {
                content_hash: self.item.content_hash.clone(),
                match_value: value.clone(),
                pattern: entry.pattern.to_string(),
            })
        })
    }
}

/// Returned by [`ResultSender::send`] once the consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Result channel closed")]
pub struct ChannelClosed;

#[derive(Debug, Clone)]
pub enum ResultSender {
    Unbounded(mpsc::UnboundedSender<MatchedItem>),
    Bounded(mpsc::Sender<MatchedItem>),
}

impl ResultSender {
    pub async fn send(&self, entry: MatchedItem) -> Result<(), ChannelClosed> {
        match self {
            ResultSender::Unbounded(tx) => tx.send(entry).map_err(|_| ChannelClosed),
            ResultSender::Bounded(tx) => tx.send(entry).await.map_err(|_| ChannelClosed),
        }
    }
}

#[derive(Debug)]
pub enum ResultReceiver {
    Unbounded(mpsc::UnboundedReceiver<MatchedItem>),
    Bounded(mpsc::Receiver<MatchedItem>),
}

impl ResultReceiver {
    /// Next entry, or `None` once every sender is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<MatchedItem> {
        match self {
            ResultReceiver::Unbounded(rx) => rx.recv().await,
            ResultReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        match self {
            ResultReceiver::Unbounded(rx) => rx.len(),
            ResultReceiver::Bounded(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create the Result Channel. `None` means unbounded.
pub fn result_channel(capacity: Option<usize>) -> (ResultSender, ResultReceiver) {
    match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (ResultSender::Bounded(tx), ResultReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (ResultSender::Unbounded(tx), ResultReceiver::Unbounded(rx))
        }
    }
}
