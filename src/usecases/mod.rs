//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! ingestion pipeline. Each use case owns one concern.
//!
//! Use cases:
//! - `FeedConnection`: one streaming connection and its reconnect loop
//! - `ConnectionRegistry`: feed → connection map, status snapshots
//! - `DataBuffer`: bounded per-feed observation history
//! - `AlertSink`: bounded alert log with acknowledgement
//! - `StreamCoordinator`: wires everything into one pipeline

pub mod alert_sink;
pub mod coordinator;
pub mod data_buffer;
pub mod feed_connection;
pub mod registry;

pub use alert_sink::AlertSink;
pub use coordinator::{CoordinatorSettings, CoordinatorStatus, StreamCoordinator};
pub use data_buffer::DataBuffer;
pub use feed_connection::{ConnectionContext, ConnectionState, ConnectionStatus, FeedConnection};
pub use registry::ConnectionRegistry;
