//! Feed Transport Port - Injected Streaming Connection Interface
//!
//! The host environment supplies a `FeedDialer` that knows how to open a
//! streaming connection for a feed identifier (WebSocket, in-memory
//! channel, test double). The core never hard-codes endpoints.

use async_trait::async_trait;

use crate::domain::observation::FeedId;

/// Dial or handshake failure.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  /// The endpoint could not be built for this feed.
  #[error("invalid endpoint for feed {feed}: {reason}")]
  InvalidEndpoint {
    /// Feed being dialed.
    feed: FeedId,
    /// Why the endpoint is invalid.
    reason: String,
  },
  /// Handshake did not complete in time.
  #[error("connection to {feed} timed out after {timeout_ms}ms")]
  Timeout {
    /// Feed being dialed.
    feed: FeedId,
    /// Timeout that elapsed.
    timeout_ms: u64,
  },
  /// Transport refused or failed the handshake.
  #[error("handshake with {feed} failed: {reason}")]
  Handshake {
    /// Feed being dialed.
    feed: FeedId,
    /// Transport-level reason.
    reason: String,
  },
}

/// Failure while receiving on an open transport.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// An open streaming connection delivering text frames.
///
/// Implementors must release the underlying resource when dropped, so a
/// transport is never leaked even if `close` is not reached.
#[async_trait]
pub trait FeedTransport: Send {
  /// Wait for the next frame.
  ///
  /// Returns `None` once the remote side has closed the stream.
  async fn next_message(&mut self) -> Option<Result<String, TransportError>>;

  /// Close the connection gracefully.
  async fn close(&mut self);
}

/// Factory for feed transports.
#[async_trait]
pub trait FeedDialer: Send + Sync + 'static {
  /// Open a streaming connection for `feed`.
  async fn dial(&self, feed: &FeedId) -> Result<Box<dyn FeedTransport>, ConnectError>;
}
