//! Data Buffer - Bounded Per-Feed Observation History
//!
//! Keeps the most recent N observations of every feed for display and
//! for rules that need short history. Observations are stored behind
//! `Arc` so readers copy handles, not payloads.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::observation::{FeedId, Observation};
use crate::domain::ring_buffer::RingBuffer;

/// Default per-feed capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Per-feed ring buffers behind one lock.
pub struct DataBuffer {
  /// Fixed capacity of every feed's ring.
  capacity: usize,
  /// Ring per feed, created on first append.
  feeds: RwLock<HashMap<FeedId, RingBuffer<Arc<Observation>>>>,
}

impl Default for DataBuffer {
  fn default() -> Self {
    Self::new(DEFAULT_BUFFER_CAPACITY)
  }
}

impl DataBuffer {
  /// Create a buffer retaining `capacity` observations per feed (minimum 1).
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      feeds: RwLock::new(HashMap::new()),
    }
  }

  /// Append in arrival order, evicting the feed's oldest entry when full.
  pub fn append(&self, observation: Arc<Observation>) {
    let mut feeds = self.feeds.write();
    feeds
      .entry(observation.feed.clone())
      .or_insert_with(|| RingBuffer::new(self.capacity))
      .push(observation);
  }

  /// Append and return up to `n` observations that preceded it, newest
  /// last. Both happen under one write lock, so concurrent appends to the
  /// same feed cannot slip between the history and the new entry.
  pub fn append_with_history(&self, observation: Arc<Observation>, n: usize) -> Vec<Arc<Observation>> {
    let mut feeds = self.feeds.write();
    let ring = feeds
      .entry(observation.feed.clone())
      .or_insert_with(|| RingBuffer::new(self.capacity));
    let history = ring.recent(n);
    ring.push(observation);
    history
  }

  /// Up to `n` most recent observations of `feed`, newest last.
  ///
  /// Unknown feeds yield an empty vector.
  pub fn recent(&self, feed: &str, n: usize) -> Vec<Arc<Observation>> {
    self
      .feeds
      .read()
      .get(feed)
      .map(|ring| ring.recent(n))
      .unwrap_or_default()
  }

  /// Most recent observation of `feed`.
  pub fn latest(&self, feed: &str) -> Option<Arc<Observation>> {
    self.feeds.read().get(feed).and_then(|ring| ring.last().cloned())
  }

  /// Number of observations held for `feed`.
  pub fn len(&self, feed: &str) -> usize {
    self.feeds.read().get(feed).map_or(0, RingBuffer::len)
  }

  /// Feeds that have received at least one observation, sorted.
  pub fn feeds(&self) -> Vec<FeedId> {
    let mut feeds: Vec<FeedId> = self.feeds.read().keys().cloned().collect();
    feeds.sort();
    feeds
  }

  /// Fixed per-feed capacity.
  pub const fn capacity(&self) -> usize {
    self.capacity
  }
}
