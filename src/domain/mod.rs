//! Domain layer - Core telemetry types and detection logic.
//!
//! Pure data types and algorithms: observations and their wire decoding,
//! alert records, the fixed-capacity ring buffer, reconnect backoff and the
//! threshold rule engine. Nothing here touches the network or spawns tasks
//! (hexagonal architecture inner ring).

pub mod alert;
pub mod backoff;
pub mod observation;
pub mod ring_buffer;
pub mod rules;

// Re-export core types for convenience
pub use alert::{AlertKind, AlertRecord, Severity};
pub use backoff::{Backoff, ReconnectPolicy};
pub use observation::{DecodeError, FeedId, Observation};
pub use ring_buffer::RingBuffer;
pub use rules::{AlertRule, RuleEngine};
