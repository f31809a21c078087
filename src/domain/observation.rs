//! Observation types and wire decoding.
//!
//! An `Observation` is one timestamped data point received from a feed.
//! Feeds deliver JSON text frames of the form:
//!
//! ```json
//! { "payload": { "response_time_ms": 120 }, "timestamp": "2026-01-01T00:00:00Z", "source": "edge-1" }
//! ```
//!
//! `data` is accepted as an alias for `payload`. `timestamp` may be an
//! RFC 3339 string or Unix milliseconds and defaults to the receive time.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque name of a logical feed (e.g. `performance_metrics`).
pub type FeedId = String;

/// Source label used when the frame does not name one.
pub const DEFAULT_SOURCE: &str = "stream";

/// One data point received from a feed. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Feed this observation arrived on.
    pub feed: FeedId,
    /// Producer timestamp (or receive time when absent).
    pub timestamp: DateTime<Utc>,
    /// Structured payload as delivered by the feed.
    pub payload: Value,
    /// Producer label.
    pub source: String,
}

/// A received frame that could not be interpreted as an `Observation`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON or does not have the expected shape.
    #[error("invalid observation frame: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Frame carries neither `payload` nor `data`.
    #[error("observation frame has no payload")]
    MissingPayload,
    /// Numeric timestamp outside the representable range.
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}

/// Raw frame as delivered on the wire.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default, alias = "data")]
    payload: Option<Value>,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Rfc3339(DateTime<Utc>),
}

impl Observation {
    /// Build an observation stamped with the current time.
    pub fn new(feed: impl Into<FeedId>, payload: Value) -> Self {
        Self {
            feed: feed.into(),
            timestamp: Utc::now(),
            payload,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Override the timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the source label.
    #[must_use]
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Decode a text frame received on `feed`.
    ///
    /// # Errors
    /// Returns `DecodeError` if the frame is not JSON, lacks a payload or
    /// carries an unrepresentable timestamp.
    pub fn decode(feed: &str, text: &str) -> Result<Self, DecodeError> {
        let frame: WireFrame = serde_json::from_str(text)?;
        let payload = frame
            .payload
            .filter(|p| !p.is_null())
            .ok_or(DecodeError::MissingPayload)?;

        let timestamp = match frame.timestamp {
            Some(WireTimestamp::Rfc3339(ts)) => ts,
            Some(WireTimestamp::Millis(ms)) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or(DecodeError::TimestampOutOfRange(ms))?,
            None => Utc::now(),
        };

        Ok(Self {
            feed: feed.to_string(),
            timestamp,
            payload,
            source: frame.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        })
    }

    /// Numeric payload field, if present and numeric.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.payload.get(field).and_then(Value::as_f64)
    }

    /// String payload field, if present and a string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// Raw payload field.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_frame() {
        let obs = Observation::decode(
            "performance_metrics",
            r#"{"payload":{"response_time_ms":120},"timestamp":"2026-01-01T00:00:00Z","source":"edge-1"}"#,
        )
        .unwrap();

        assert_eq!(obs.feed, "performance_metrics");
        assert_eq!(obs.source, "edge-1");
        assert_eq!(obs.number("response_time_ms"), Some(120.0));
        assert_eq!(obs.timestamp.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_decode_data_alias_and_millis() {
        let obs = Observation::decode(
            "system_health",
            r#"{"data":{"status":"degraded"},"timestamp":1700000000000}"#,
        )
        .unwrap();

        assert_eq!(obs.text("status"), Some("degraded"));
        assert_eq!(obs.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(obs.source, DEFAULT_SOURCE);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Observation::decode("f", "not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            Observation::decode("f", r#"{"source":"x"}"#),
            Err(DecodeError::MissingPayload)
        ));
        assert!(matches!(
            Observation::decode("f", r#"{"payload":null}"#),
            Err(DecodeError::MissingPayload)
        ));
    }

    #[test]
    fn test_field_accessors_ignore_wrong_types() {
        let obs = Observation::new("f", json!({ "price": "29", "status": 3 }));
        assert_eq!(obs.number("price"), None);
        assert_eq!(obs.text("status"), None);
        assert_eq!(obs.number("missing"), None);
    }
}
