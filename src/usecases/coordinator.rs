//! Stream Coordinator - Top-Level Ingestion Pipeline
//!
//! Wires the registry, buffer, rule engine and alert sink together:
//! 1. `start` connects each feed in the given order
//! 2. every decoded observation is appended to the feed's buffer
//! 3. rules evaluate it against the prior history of that feed
//! 4. produced alerts are published to the sink and the listener
//!
//! The observation path runs on whichever connection task delivered the
//! observation, so it is safe to call concurrently from many feeds.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::alert::AlertRecord;
use crate::domain::backoff::ReconnectPolicy;
use crate::domain::observation::{FeedId, Observation};
use crate::domain::rules::{MAX_HISTORY_WINDOW, RuleEngine};
use crate::ports::listener::{NoopListener, ObservationHandler, StreamListener};
use crate::ports::transport::FeedDialer;

use super::alert_sink::{AlertSink, DEFAULT_ALERT_CAPACITY};
use super::data_buffer::{DataBuffer, DEFAULT_BUFFER_CAPACITY};
use super::feed_connection::{ConnectionContext, ConnectionState, ConnectionStatus, FeedConnection};
use super::registry::ConnectionRegistry;

/// Tunables for a coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
  /// Reconnect limits applied to every feed.
  pub policy: ReconnectPolicy,
  /// Observations retained per feed.
  pub buffer_capacity: usize,
  /// Alerts retained in the log.
  pub alert_capacity: usize,
}

impl Default for CoordinatorSettings {
  fn default() -> Self {
    Self {
      policy: ReconnectPolicy::default(),
      buffer_capacity: DEFAULT_BUFFER_CAPACITY,
      alert_capacity: DEFAULT_ALERT_CAPACITY,
    }
  }
}

/// Aggregate status for connection-status displays.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
  /// Per-connection status, in subscription order.
  pub connections: Vec<ConnectionStatus>,
  /// Connections currently open.
  pub connected_streams: usize,
  /// Alerts awaiting acknowledgement.
  pub unacknowledged_alerts: usize,
  /// Alerts retained in the log.
  pub total_alerts: usize,
}

/// Shared observation path: buffer → rules → alerts.
struct Pipeline {
  buffer: DataBuffer,
  rules: RuleEngine,
  alerts: AlertSink,
  listener: Arc<dyn StreamListener>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl ObservationHandler for Pipeline {
  fn handle(&self, observation: Observation) {
    let observation = Arc::new(observation);
    if let Some(metrics) = &self.metrics {
      metrics.record_observation(&observation);
    }

    // Rules see prior observations only.
    let history = self
      .buffer
      .append_with_history(Arc::clone(&observation), MAX_HISTORY_WINDOW);

    let listener = &self.listener;
    if catch_unwind(AssertUnwindSafe(|| listener.on_observation(&observation))).is_err() {
      error!(feed = %observation.feed, "Listener panicked on observation, continuing");
    }

    let alerts = self.rules.evaluate(&observation, &history);
    if !alerts.is_empty() {
      debug!(feed = %observation.feed, count = alerts.len(), "Rules fired");
    }
    for alert in alerts {
      if let Some(metrics) = &self.metrics {
        metrics.record_alert(&alert);
      }
      self.alerts.publish(alert);
    }
  }
}

/// Builder for `StreamCoordinator`.
pub struct CoordinatorBuilder {
  dialer: Arc<dyn FeedDialer>,
  listener: Arc<dyn StreamListener>,
  settings: CoordinatorSettings,
  rules: RuleEngine,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl CoordinatorBuilder {
  /// Observer for observations and alerts (default: none).
  #[must_use]
  pub fn listener(mut self, listener: Arc<dyn StreamListener>) -> Self {
    self.listener = listener;
    self
  }

  /// Reconnect and capacity settings.
  #[must_use]
  pub fn settings(mut self, settings: CoordinatorSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Replace the standard rule set.
  #[must_use]
  pub fn rules(mut self, rules: RuleEngine) -> Self {
    self.rules = rules;
    self
  }

  /// Record Prometheus metrics.
  #[must_use]
  pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Assemble the coordinator. No connections are opened yet.
  pub fn build(self) -> StreamCoordinator {
    let listener = Arc::clone(&self.listener);
    let alerts = AlertSink::new(self.settings.alert_capacity)
      .with_consumer(move |alert| listener.on_alert(alert));

    let pipeline = Arc::new(Pipeline {
      buffer: DataBuffer::new(self.settings.buffer_capacity),
      rules: self.rules,
      alerts,
      listener: self.listener,
      metrics: self.metrics.clone(),
    });

    let ctx = ConnectionContext {
      dialer: self.dialer,
      handler: Arc::clone(&pipeline) as Arc<dyn ObservationHandler>,
      policy: self.settings.policy,
      metrics: self.metrics,
    };

    StreamCoordinator {
      registry: ConnectionRegistry::new(ctx),
      pipeline,
    }
  }
}

/// Orchestrates feed subscriptions and the observation pipeline.
pub struct StreamCoordinator {
  registry: ConnectionRegistry,
  pipeline: Arc<Pipeline>,
}

impl StreamCoordinator {
  /// Start building a coordinator around an injected dialer.
  pub fn builder(dialer: Arc<dyn FeedDialer>) -> CoordinatorBuilder {
    CoordinatorBuilder {
      dialer,
      listener: Arc::new(NoopListener),
      settings: CoordinatorSettings::default(),
      rules: RuleEngine::standard(),
      metrics: None,
    }
  }

  /// Coordinator with the standard rules and the given listener/settings.
  pub fn new(
    dialer: Arc<dyn FeedDialer>,
    listener: Arc<dyn StreamListener>,
    settings: CoordinatorSettings,
  ) -> Self {
    Self::builder(dialer).listener(listener).settings(settings).build()
  }

  /// Connect every feed, in order. Must be called within a tokio runtime.
  ///
  /// Connection failures are retried internally and reported through
  /// `status()`; they never fail this call.
  #[instrument(skip(self, feeds), fields(feeds = feeds.len()))]
  pub fn start(&self, feeds: &[FeedId]) {
    for feed in feeds {
      self.registry.connect(feed);
    }
    info!(subscriptions = self.registry.len(), "Stream coordinator started");
  }

  /// Subscribe to one more feed (idempotent while the feed is live).
  pub fn subscribe(&self, feed: &str) -> Arc<FeedConnection> {
    self.registry.connect(feed)
  }

  /// Unsubscribe from a feed. Buffered history is kept.
  pub async fn unsubscribe(&self, feed: &str) -> bool {
    self.registry.disconnect(feed).await
  }

  /// Stop every connection and wait for their tasks to finish.
  #[instrument(skip(self))]
  pub async fn stop(&self) {
    let stopped = self.registry.disconnect_all().await;
    info!(stopped, "Stream coordinator stopped");
  }

  /// Feed an observation into the pipeline directly, bypassing transports.
  pub fn ingest(&self, observation: Observation) {
    self.pipeline.handle(observation);
  }

  /// Aggregate status snapshot.
  pub fn status(&self) -> CoordinatorStatus {
    let connections = self.registry.snapshot();
    let connected_streams = connections
      .iter()
      .filter(|c| c.state == ConnectionState::Open)
      .count();

    CoordinatorStatus {
      connections,
      connected_streams,
      unacknowledged_alerts: self.pipeline.alerts.unacknowledged_count(),
      total_alerts: self.pipeline.alerts.len(),
    }
  }

  /// Up to `n` most recent observations of `feed`, newest last.
  pub fn recent(&self, feed: &str, n: usize) -> Vec<Arc<Observation>> {
    self.pipeline.buffer.recent(feed, n)
  }

  /// Acknowledge an alert by id.
  pub fn acknowledge(&self, id: &str) -> bool {
    self.pipeline.alerts.acknowledge(id)
  }

  /// Unacknowledged alerts, newest first.
  pub fn unacknowledged(&self) -> Vec<AlertRecord> {
    self.pipeline.alerts.unacknowledged()
  }

  /// The alert log.
  pub fn alerts(&self) -> &AlertSink {
    &self.pipeline.alerts
  }

  /// The observation buffer.
  pub fn buffer(&self) -> &DataBuffer {
    &self.pipeline.buffer
  }

  /// The connection registry.
  pub const fn registry(&self) -> &ConnectionRegistry {
    &self.registry
  }
}
