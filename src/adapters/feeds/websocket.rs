//! WebSocket Feed Dialer - Real-time Telemetry over WebSocket
//!
//! Opens one WebSocket per feed using a URL template such as
//! `wss://host/realtime/{tool_id}/{feed_id}`. Text frames are passed to
//! the core verbatim; binary frames are read as UTF-8 (lossy) so a bad
//! frame is dropped by the decoder instead of tearing down the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument};

use crate::domain::observation::FeedId;
use crate::ports::transport::{ConnectError, FeedDialer, FeedTransport, TransportError};

/// Placeholder replaced by the feed identifier.
pub const FEED_PLACEHOLDER: &str = "{feed_id}";
/// Placeholder replaced by the tool identifier.
pub const TOOL_PLACEHOLDER: &str = "{tool_id}";

/// Dials feeds over WebSocket (rustls).
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    /// Endpoint template with `{tool_id}` / `{feed_id}` placeholders.
    url_template: String,
    /// Tool identifier substituted into the template.
    tool_id: String,
    /// Handshake timeout.
    connect_timeout: Duration,
}

impl WebSocketDialer {
    /// Create a dialer from an endpoint template.
    pub fn new(
        url_template: impl Into<String>,
        tool_id: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            url_template: url_template.into(),
            tool_id: tool_id.into(),
            connect_timeout,
        }
    }

    /// Resolve the endpoint for `feed`.
    ///
    /// # Errors
    /// `ConnectError::InvalidEndpoint` if the template lacks `{feed_id}`
    /// or does not use a `ws://` / `wss://` scheme.
    pub fn endpoint(&self, feed: &str) -> Result<String, ConnectError> {
        let invalid = |reason: &str| ConnectError::InvalidEndpoint {
            feed: feed.to_string(),
            reason: reason.to_string(),
        };

        if !self.url_template.contains(FEED_PLACEHOLDER) {
            return Err(invalid("template has no {feed_id} placeholder"));
        }
        if !(self.url_template.starts_with("ws://") || self.url_template.starts_with("wss://")) {
            return Err(invalid("scheme must be ws:// or wss://"));
        }

        Ok(self
            .url_template
            .replace(TOOL_PLACEHOLDER, &self.tool_id)
            .replace(FEED_PLACEHOLDER, feed))
    }
}

#[async_trait]
impl FeedDialer for WebSocketDialer {
    #[instrument(skip(self))]
    async fn dial(&self, feed: &FeedId) -> Result<Box<dyn FeedTransport>, ConnectError> {
        let url = self.endpoint(feed)?;

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ConnectError::Timeout {
                feed: feed.clone(),
                timeout_ms: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| ConnectError::Handshake {
                feed: feed.clone(),
                reason: e.to_string(),
            })?;

        info!(url = %url, "WebSocket connected");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// One open WebSocket. Dropping it drops the socket.
struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket close frame received");
                    return None;
                }
                // Pong is handled automatically by tungstenite
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_substitutes_placeholders() {
        let dialer = WebSocketDialer::new(
            "wss://telemetry.example.com/realtime/{tool_id}/{feed_id}",
            "analytics",
            Duration::from_secs(5),
        );
        assert_eq!(
            dialer.endpoint("user_activity").unwrap(),
            "wss://telemetry.example.com/realtime/analytics/user_activity"
        );
    }

    #[test]
    fn test_endpoint_rejects_bad_templates() {
        let no_feed = WebSocketDialer::new("wss://h/realtime", "t", Duration::from_secs(1));
        assert!(matches!(
            no_feed.endpoint("f"),
            Err(ConnectError::InvalidEndpoint { .. })
        ));

        let http = WebSocketDialer::new("https://h/{feed_id}", "t", Duration::from_secs(1));
        assert!(http.endpoint("f").is_err());
    }

    #[tokio::test]
    async fn test_dial_refused_is_handshake_error() {
        // Port 9 (discard) is closed on loopback in test environments.
        let dialer = WebSocketDialer::new("ws://127.0.0.1:9/{feed_id}", "t", Duration::from_secs(2));
        let result = dialer.dial(&"f".to_string()).await;
        assert!(matches!(
            result,
            Err(ConnectError::Handshake { .. } | ConnectError::Timeout { .. })
        ));
    }
}
