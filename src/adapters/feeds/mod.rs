//! Feed Adapters - Transports and Consumers for Telemetry Streams
//!
//! Provides:
//! - WebSocket: production dialer built from a URL template
//! - Memory: channel-backed dialer for simulations and tests
//! - Logging: `StreamListener` that reports to `tracing`

pub mod logging;
pub mod memory;
pub mod websocket;

pub use logging::LoggingListener;
pub use memory::{ChannelDialer, SessionSender};
pub use websocket::WebSocketDialer;
