//! Connection Registry - Single Source of Truth for Subscriptions
//!
//! Tracks every active `FeedConnection` by feed identifier. `connect` is
//! idempotent for live connections; a connection that exhausted its
//! reconnect attempts is replaced on the next `connect` (resubscribe).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::join_all;
use parking_lot::RwLock;
use tracing::{info, instrument};

use super::feed_connection::{ConnectionContext, ConnectionState, ConnectionStatus, FeedConnection};

/// Registry entry: the connection plus its subscription order.
struct Entry {
  sequence: u64,
  connection: Arc<FeedConnection>,
}

/// Owns the feed → connection map.
pub struct ConnectionRegistry {
  /// Shared context handed to every new connection.
  ctx: ConnectionContext,
  /// Live connections keyed by feed.
  connections: RwLock<HashMap<String, Entry>>,
  /// Monotonic subscription counter for stable snapshot ordering.
  next_sequence: AtomicU64,
}

impl ConnectionRegistry {
  /// Create an empty registry.
  pub fn new(ctx: ConnectionContext) -> Self {
    Self {
      ctx,
      connections: RwLock::new(HashMap::new()),
      next_sequence: AtomicU64::new(0),
    }
  }

  /// Connect to `feed`, or return the existing live connection.
  ///
  /// Must be called within a tokio runtime.
  #[instrument(skip(self))]
  pub fn connect(&self, feed: &str) -> Arc<FeedConnection> {
    let mut connections = self.connections.write();

    if let Some(entry) = connections.get(feed) {
      if entry.connection.is_active() {
        return Arc::clone(&entry.connection);
      }
      info!("Replacing finished connection");
    }

    let connection = FeedConnection::connect(feed.to_string(), self.ctx.clone());
    let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
    connections.insert(
      feed.to_string(),
      Entry {
        sequence,
        connection: Arc::clone(&connection),
      },
    );

    info!(subscriptions = connections.len(), "Feed subscribed");
    connection
  }

  /// Stop and remove the connection for `feed`.
  ///
  /// Returns `false` (no-op) if the feed is unknown.
  #[instrument(skip(self))]
  pub async fn disconnect(&self, feed: &str) -> bool {
    let removed = self.connections.write().remove(feed);
    match removed {
      Some(entry) => {
        entry.connection.stop().await;
        info!("Feed unsubscribed");
        true
      }
      None => false,
    }
  }

  /// Stop and remove every connection concurrently.
  #[instrument(skip(self))]
  pub async fn disconnect_all(&self) -> usize {
    let drained: Vec<Entry> = self.connections.write().drain().map(|(_, e)| e).collect();
    let count = drained.len();

    join_all(drained.iter().map(|e| e.connection.stop())).await;

    info!(stopped = count, "All feeds unsubscribed");
    count
  }

  /// Connection for `feed`, if registered.
  pub fn get(&self, feed: &str) -> Option<Arc<FeedConnection>> {
    self.connections.read().get(feed).map(|e| Arc::clone(&e.connection))
  }

  /// Number of registered connections.
  pub fn len(&self) -> usize {
    self.connections.read().len()
  }

  /// Whether no connections are registered.
  pub fn is_empty(&self) -> bool {
    self.connections.read().is_empty()
  }

  /// Status of every connection, in subscription order.
  ///
  /// The map lock is held only long enough to clone the handles.
  pub fn snapshot(&self) -> Vec<ConnectionStatus> {
    let mut handles: Vec<(u64, Arc<FeedConnection>)> = self
      .connections
      .read()
      .values()
      .map(|e| (e.sequence, Arc::clone(&e.connection)))
      .collect();
    handles.sort_by_key(|(sequence, _)| *sequence);

    handles.into_iter().map(|(_, c)| c.status()).collect()
  }

  /// Number of connections currently `Open`.
  pub fn connected_count(&self) -> usize {
    self
      .connections
      .read()
      .values()
      .filter(|e| e.connection.state() == ConnectionState::Open)
      .count()
  }
}
