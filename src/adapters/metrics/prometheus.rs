//! Prometheus Metrics Registry - Telemetry Pipeline Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers observation throughput, decode failures, alert volume and
//! per-feed connection health.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::domain::alert::AlertRecord;
use crate::domain::observation::Observation;
use crate::usecases::feed_connection::ConnectionState;

/// Centralized Prometheus metrics for the telemetry core.
///
/// All metrics follow the naming convention `telemetry_core_*` and carry
/// a `feed` label where they concern a single feed.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Observations accepted into the pipeline.
    pub observations_received: IntCounterVec,
    /// Frames dropped because they could not be decoded.
    pub decode_errors: IntCounterVec,
    /// Failed dials and transport errors.
    pub connection_errors: IntCounterVec,
    /// Reconnect attempts scheduled.
    pub reconnect_attempts: IntCounterVec,
    /// Alerts published, by kind and severity.
    pub alerts_published: IntCounterVec,
    /// Feed connection status (1 = open, 0 = otherwise).
    pub feed_connected: IntGaugeVec,
    /// Connections that gave up after exhausting their attempts.
    pub connections_exhausted: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let observations_received = IntCounterVec::new(
            Opts::new(
                "telemetry_core_observations_total",
                "Observations accepted into the pipeline",
            ),
            &["feed"],
        )?;

        let decode_errors = IntCounterVec::new(
            Opts::new(
                "telemetry_core_decode_errors_total",
                "Frames dropped because they could not be decoded",
            ),
            &["feed"],
        )?;

        let connection_errors = IntCounterVec::new(
            Opts::new(
                "telemetry_core_connection_errors_total",
                "Failed dials and transport errors",
            ),
            &["feed"],
        )?;

        let reconnect_attempts = IntCounterVec::new(
            Opts::new(
                "telemetry_core_reconnect_attempts_total",
                "Reconnect attempts scheduled",
            ),
            &["feed"],
        )?;

        let alerts_published = IntCounterVec::new(
            Opts::new("telemetry_core_alerts_total", "Alerts published"),
            &["kind", "severity"],
        )?;

        let feed_connected = IntGaugeVec::new(
            Opts::new(
                "telemetry_core_feed_connected",
                "Feed connection status (1=open, 0=not open)",
            ),
            &["feed"],
        )?;

        let connections_exhausted = IntCounter::new(
            "telemetry_core_connections_exhausted_total",
            "Connections that exhausted their reconnect attempts",
        )?;

        // Register all metrics
        registry.register(Box::new(observations_received.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(connection_errors.clone()))?;
        registry.register(Box::new(reconnect_attempts.clone()))?;
        registry.register(Box::new(alerts_published.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(connections_exhausted.clone()))?;

        Ok(Self {
            registry,
            observations_received,
            decode_errors,
            connection_errors,
            reconnect_attempts,
            alerts_published,
            feed_connected,
            connections_exhausted,
        })
    }

    /// Count an accepted observation.
    pub fn record_observation(&self, observation: &Observation) {
        self.observations_received
            .with_label_values(&[observation.feed.as_str()])
            .inc();
    }

    /// Count a published alert.
    pub fn record_alert(&self, alert: &AlertRecord) {
        let kind = alert.kind.to_string();
        let severity = alert.severity.to_string();
        self.alerts_published
            .with_label_values(&[kind.as_str(), severity.as_str()])
            .inc();
    }

    /// Reflect a connection state transition.
    pub fn record_state(&self, feed: &str, state: ConnectionState) {
        let open = i64::from(state == ConnectionState::Open);
        self.feed_connected.with_label_values(&[feed]).set(open);
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    metrics.render().map_err(|e| {
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_includes_recorded_series() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_observation(&Observation::new("user_activity", json!({})));
        metrics.record_state("user_activity", ConnectionState::Open);

        let text = metrics.render().unwrap();
        assert!(text.contains("telemetry_core_observations_total{feed=\"user_activity\"} 1"));
        assert!(text.contains("telemetry_core_feed_connected{feed=\"user_activity\"} 1"));
    }

    #[test]
    fn test_state_gauge_drops_when_not_open() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_state("f", ConnectionState::Open);
        metrics.record_state("f", ConnectionState::Reconnecting);
        assert_eq!(metrics.feed_connected.with_label_values(&["f"]).get(), 0);
    }
}
