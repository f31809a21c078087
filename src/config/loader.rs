//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::adapters::feeds::websocket::FEED_PLACEHOLDER;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    subscriptions = config.feeds.subscriptions.len(),
    max_attempts = config.reconnect.max_attempts,
    base_delay_ms = config.reconnect.base_delay_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Returns an error if parsing fails or validation rules are violated.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "Service name must not be empty"
  );

  // Feed validation
  anyhow::ensure!(
    config.feeds.url_template.contains(FEED_PLACEHOLDER),
    "url_template must contain {FEED_PLACEHOLDER}, got {}",
    config.feeds.url_template
  );
  anyhow::ensure!(
    config.feeds.url_template.starts_with("ws://")
      || config.feeds.url_template.starts_with("wss://"),
    "url_template must use ws:// or wss://, got {}",
    config.feeds.url_template
  );
  anyhow::ensure!(
    !config.feeds.subscriptions.is_empty(),
    "At least one feed subscription must be configured"
  );

  let mut seen = HashSet::new();
  for (i, feed) in config.feeds.subscriptions.iter().enumerate() {
    anyhow::ensure!(!feed.is_empty(), "Subscription {i} has an empty feed id");
    anyhow::ensure!(seen.insert(feed), "Feed {feed} is subscribed twice");
  }

  anyhow::ensure!(
    config.feeds.connect_timeout_ms > 0,
    "connect_timeout_ms must be positive"
  );

  // Reconnect validation
  anyhow::ensure!(
    config.reconnect.base_delay_ms > 0,
    "base_delay_ms must be positive"
  );
  anyhow::ensure!(
    (0.0..1.0).contains(&config.reconnect.jitter_factor),
    "jitter_factor must be in [0, 1), got {}",
    config.reconnect.jitter_factor
  );

  // Buffer validation
  anyhow::ensure!(
    config.buffers.observation_capacity > 0,
    "observation_capacity must be positive"
  );
  anyhow::ensure!(
    config.buffers.alert_capacity > 0,
    "alert_capacity must be positive"
  );

  Ok(())
}
