//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Feed endpoints,
//! subscriptions, reconnect limits and buffer sizes are externalized here;
//! the domain layer only sees the derived `CoordinatorSettings`.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::feeds::WebSocketDialer;
use crate::domain::backoff::ReconnectPolicy;
use crate::usecases::coordinator::CoordinatorSettings;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any feed is connected.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Feed endpoint and subscriptions.
  pub feeds: FeedsConfig,
  /// Reconnection backoff.
  #[serde(default)]
  pub reconnect: ReconnectConfig,
  /// Retention limits.
  #[serde(default)]
  pub buffers: BuffersConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Feed endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
  /// Tool identifier substituted for `{tool_id}`.
  pub tool_id: String,
  /// Endpoint template, e.g. `wss://host/realtime/{tool_id}/{feed_id}`.
  pub url_template: String,
  /// Feeds to subscribe at startup, in order.
  pub subscriptions: Vec<String>,
  /// Handshake timeout (milliseconds).
  #[serde(default = "default_connect_timeout")]
  pub connect_timeout_ms: u64,
}

/// Reconnection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
  /// Consecutive failures tolerated per feed. Zero disables reconnection.
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// First reconnect delay (milliseconds), doubled per attempt.
  #[serde(default = "default_base_delay")]
  pub base_delay_ms: u64,
  /// Delay jitter as a fraction (0.1 = ±10%).
  #[serde(default)]
  pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay(),
      jitter_factor: 0.0,
    }
  }
}

/// Retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuffersConfig {
  /// Observations retained per feed.
  #[serde(default = "default_observation_capacity")]
  pub observation_capacity: usize,
  /// Alerts retained in the log.
  #[serde(default = "default_alert_capacity")]
  pub alert_capacity: usize,
}

impl Default for BuffersConfig {
  fn default() -> Self {
    Self {
      observation_capacity: default_observation_capacity(),
      alert_capacity: default_alert_capacity(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl AppConfig {
  /// Reconnect policy applied to every feed.
  pub const fn reconnect_policy(&self) -> ReconnectPolicy {
    ReconnectPolicy {
      max_attempts: self.reconnect.max_attempts,
      base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
      jitter_factor: self.reconnect.jitter_factor,
    }
  }

  /// Coordinator tunables derived from this config.
  pub const fn coordinator_settings(&self) -> CoordinatorSettings {
    CoordinatorSettings {
      policy: self.reconnect_policy(),
      buffer_capacity: self.buffers.observation_capacity,
      alert_capacity: self.buffers.alert_capacity,
    }
  }

  /// WebSocket dialer for the configured endpoint.
  pub fn dialer(&self) -> WebSocketDialer {
    WebSocketDialer::new(
      self.feeds.url_template.clone(),
      self.feeds.tool_id.clone(),
      Duration::from_millis(self.feeds.connect_timeout_ms),
    )
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_true() -> bool {
  true
}

const fn default_connect_timeout() -> u64 {
  10_000
}

const fn default_max_attempts() -> u32 {
  5
}

const fn default_base_delay() -> u64 {
  1_000
}

const fn default_observation_capacity() -> usize {
  100
}

const fn default_alert_capacity() -> usize {
  50
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

const fn default_health_port() -> u16 {
  8080
}
