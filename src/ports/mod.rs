//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the core requires from, and
//! offers to, the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FeedDialer` / `FeedTransport`: injected streaming transport
//! - `ObservationHandler`: where a connection delivers decoded observations
//! - `StreamListener`: observer for new observations and alerts

pub mod listener;
pub mod transport;

pub use listener::{NoopListener, ObservationHandler, StreamListener};
pub use transport::{ConnectError, FeedDialer, FeedTransport, TransportError};
