//! Per-poller memory of which items have already been evaluated.
//!
//! By default every hash is remembered for the lifetime of the poller, so
//! memory grows with the number of distinct items a feed has ever carried.
//! A capacity turns the filter into an LRU: the least recently seen hashes are
//! forgotten first, and a forgotten item that reappears is evaluated again.
//! Re-evaluation is harmless because evidence writes are idempotent.

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;

use crate::feed::ContentHash;

pub enum SeenFilter {
    Unbounded(HashSet<ContentHash>),
    Bounded(LruCache<ContentHash, ()>),
}

impl SeenFilter {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        match capacity {
            Some(cap) => SeenFilter::Bounded(LruCache::new(cap)),
            None => SeenFilter::Unbounded(HashSet::new()),
        }
    }

    /// Whether `hash` was marked before. In bounded mode a hit refreshes the
    /// entry so items still present in the feed are not evicted.
    pub fn seen(&mut self, hash: &ContentHash) -> bool {
        match self {
            SeenFilter::Unbounded(set) => set.contains(hash),
            SeenFilter::Bounded(cache) => cache.get(hash).is_some(),
        }
    }

    pub fn mark_seen(&mut self, hash: ContentHash) {
        match self {
            SeenFilter::Unbounded(set) => {
                set.insert(hash);
            }
            SeenFilter::Bounded(cache) => {
                cache.put(hash, ());
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SeenFilter::Unbounded(set) => set.len(),
            SeenFilter::Bounded(cache) => cache.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SeenFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (mode, cap) = match self {
            SeenFilter::Unbounded(_) => ("unbounded", None),
            SeenFilter::Bounded(cache) => ("lru", Some(cache.cap())),
        };
        f.debug_struct("SeenFilter")
            .field("mode", &mode)
            .field("capacity", &cap)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(s: &str) -> ContentHash {
        ContentHash::of(s)
    }

    #[test]
    fn test_unseen_then_seen() {
        let mut filter = SeenFilter::new(None);
        assert!(!filter.seen(&hash("a")));
        filter.mark_seen(hash("a"));
        assert!(filter.seen(&hash("a")));
        assert!(!filter.seen(&hash("b")));
    }

    #[test]
    fn test_unbounded_never_forgets() {
        let mut filter = SeenFilter::new(None);
        for i in 0..1000 {
            filter.mark_seen(hash(&i.to_string()));
        }
        assert_eq!(filter.len(), 1000);
        assert!(filter.seen(&hash("0")));
    }

    #[test]
    fn test_mark_twice_is_single_entry() {
        let mut filter = SeenFilter::new(None);
        filter.mark_seen(hash("a"));
        filter.mark_seen(hash("a"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_bounded_evicts_least_recent() {
        let mut filter = SeenFilter::new(NonZeroUsize::new(2));
        filter.mark_seen(hash("a"));
        filter.mark_seen(hash("b"));
        filter.mark_seen(hash("c"));
        assert_eq!(filter.len(), 2);
        assert!(!filter.seen(&hash("a")));
        assert!(filter.seen(&hash("b")));
        assert!(filter.seen(&hash("c")));
    }

    #[test]
    fn test_bounded_lookup_refreshes_entry() {
        let mut filter = SeenFilter::new(NonZeroUsize::new(2));
        filter.mark_seen(hash("a"));
        filter.mark_seen(hash("b"));
        // "a" is still in the feed, so it is looked up before "c" arrives
        assert!(filter.seen(&hash("a")));
        filter.mark_seen(hash("c"));
        assert!(filter.seen(&hash("a")));
        assert!(!filter.seen(&hash("b")));
    }
}
