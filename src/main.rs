//! Real-time Telemetry Core: Entry Point
//!
//! Connects the configured telemetry feeds, evaluates alert rules on every
//! observation, and serves health/status and Prometheus endpoints.
//! Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create MetricsRegistry (Prometheus)
//! 4. Create WebSocketDialer from the feed URL template
//! 5. Build StreamCoordinator (buffer + rules + alert sink + listener)
//! 6. Start subscriptions (connections retry in the background)
//! 7. Spawn health server and metrics server
//! 8. Wait for SIGINT → graceful shutdown (stop feeds → stop servers → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use realtime_telemetry_core::adapters::feeds::LoggingListener;
use realtime_telemetry_core::adapters::metrics::{HealthServer, MetricsRegistry};
use realtime_telemetry_core::config;
use realtime_telemetry_core::usecases::coordinator::StreamCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        tool_id = %config.feeds.tool_id,
        feeds = config.feeds.subscriptions.len(),
        "Starting telemetry core"
    );

    let shutdown = CancellationToken::new();

    // ── 3. Prometheus registry ──────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);

    // ── 4. WebSocket dialer (FeedDialer port) ───────────────
    let dialer = Arc::new(config.dialer());

    // ── 5. Coordinator ──────────────────────────────────────
    let coordinator = Arc::new(
        StreamCoordinator::builder(dialer)
            .listener(Arc::new(LoggingListener))
            .settings(config.coordinator_settings())
            .metrics(Arc::clone(&metrics))
            .build(),
    );

    // ── 6. Subscribe configured feeds ───────────────────────
    coordinator.start(&config.feeds.subscriptions);

    // ── 7. Health/status server and metrics server ──────────
    let health = HealthServer::new(Arc::clone(&coordinator), config.metrics.health_port);
    let health_shutdown = shutdown.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown.clone();
        let server = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    info!("All tasks spawned: telemetry core is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Close every feed connection (bounded wait)
    if tokio::time::timeout(Duration::from_secs(10), coordinator.stop())
        .await
        .is_err()
    {
        error!("Feed connections did not stop within 10s");
    }

    // 2. Stop HTTP servers
    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    let status = coordinator.status();
    info!(
        total_alerts = status.total_alerts,
        unacknowledged = status.unacknowledged_alerts,
        "Shutdown complete"
    );
    Ok(())
}
