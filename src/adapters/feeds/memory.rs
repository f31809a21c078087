//! In-Memory Feed Dialer - Channel-backed Transport
//!
//! Lets a host (simulation, replay tool or test) drive feeds without a
//! network. Each `open_session` call queues one future connection for a
//! feed; a dial consumes the oldest queued session or fails with a
//! handshake error when none is queued.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::domain::observation::FeedId;
use crate::ports::transport::{ConnectError, FeedDialer, FeedTransport, TransportError};

/// One frame pushed by the host.
#[derive(Debug, Clone)]
enum Frame {
    Text(String),
    Error(String),
}

/// Host side of a queued session.
///
/// Dropping the sender closes the session as if the remote hung up.
#[derive(Debug, Clone)]
pub struct SessionSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl SessionSender {
    /// Deliver a text frame. Returns `false` once the transport is closed.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.send(Frame::Text(text.into())).is_ok()
    }

    /// Deliver a JSON frame wrapping `payload`.
    pub fn send_payload(&self, payload: &serde_json::Value) -> bool {
        self.send(serde_json::json!({ "payload": payload }).to_string())
    }

    /// Fail the session with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx.send(Frame::Error(reason.into())).is_ok()
    }

    /// Whether the receiving transport has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Channel-backed `FeedDialer`.
#[derive(Default)]
pub struct ChannelDialer {
    /// Queued sessions per feed, oldest first.
    sessions: Mutex<HashMap<FeedId, VecDeque<mpsc::UnboundedReceiver<Frame>>>>,
    /// Dial attempts per feed, successful or not.
    dials: Mutex<HashMap<FeedId, usize>>,
    /// Woken on every dial.
    dialed: Notify,
}

impl ChannelDialer {
    /// Dialer with no queued sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session for the next dial of `feed`.
    pub fn open_session(&self, feed: &str) -> SessionSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions
            .lock()
            .entry(feed.to_string())
            .or_default()
            .push_back(rx);
        SessionSender { tx }
    }

    /// Dial attempts made for `feed` so far.
    pub fn dial_count(&self, feed: &str) -> usize {
        self.dials.lock().get(feed).copied().unwrap_or(0)
    }

    /// Wait until `feed` has been dialed at least `n` times.
    pub async fn wait_for_dials(&self, feed: &str, n: usize) {
        loop {
            let notified = self.dialed.notified();
            if self.dial_count(feed) >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl FeedDialer for ChannelDialer {
    async fn dial(&self, feed: &FeedId) -> Result<Box<dyn FeedTransport>, ConnectError> {
        *self.dials.lock().entry(feed.clone()).or_default() += 1;
        let session = self
            .sessions
            .lock()
            .get_mut(feed)
            .and_then(VecDeque::pop_front);
        self.dialed.notify_waiters();

        session
            .map(|rx| Box::new(ChannelTransport { rx }) as Box<dyn FeedTransport>)
            .ok_or_else(|| ConnectError::Handshake {
                feed: feed.clone(),
                reason: "no session available".to_string(),
            })
    }
}

struct ChannelTransport {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FeedTransport for ChannelTransport {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(|frame| match frame {
            Frame::Text(text) => Ok(text),
            Frame::Error(reason) => Err(TransportError(reason)),
        })
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_consumes_queued_sessions_in_order() {
        let dialer = ChannelDialer::new();
        let first = dialer.open_session("f");
        let _second = dialer.open_session("f");

        let mut transport = dialer.dial(&"f".to_string()).await.unwrap();
        first.send("hello");
        assert_eq!(transport.next_message().await.unwrap().unwrap(), "hello");

        assert!(dialer.dial(&"f".to_string()).await.is_ok());
        assert!(dialer.dial(&"f".to_string()).await.is_err());
        assert_eq!(dialer.dial_count("f"), 3);
    }

    #[tokio::test]
    async fn test_close_is_visible_to_sender() {
        let dialer = ChannelDialer::new();
        let sender = dialer.open_session("f");
        let mut transport = dialer.dial(&"f".to_string()).await.unwrap();

        assert!(!sender.is_closed());
        transport.close().await;
        assert!(sender.is_closed());
        assert!(!sender.send("late"));
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_stream() {
        let dialer = ChannelDialer::new();
        let sender = dialer.open_session("f");
        let mut transport = dialer.dial(&"f".to_string()).await.unwrap();

        sender.fail("reset");
        drop(sender);
        assert!(transport.next_message().await.unwrap().is_err());
        assert!(transport.next_message().await.is_none());
    }
}
