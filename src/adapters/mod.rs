//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSockets, in-memory channels, HTTP servers).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `feeds`: feed dialers and the logging listener
//! - `metrics`: Prometheus metrics export and health/status endpoints

pub mod feeds;
pub mod metrics;
