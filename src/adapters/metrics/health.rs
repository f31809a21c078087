//! Health Check Server - Liveness, Readiness and Stream Status
//!
//! Exposes liveness/readiness checks and read-only status views via axum 0.7:
//! - `/live`: 200 while the process runs
//! - `/ready`: 200 when at least one stream is open
//! - `/status`: coordinator status (connections, counters, alert counts)
//! - `/alerts`: unacknowledged alerts, newest first
//! - `POST /alerts/:id/ack`: acknowledge one alert

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::usecases::coordinator::StreamCoordinator;

/// Axum-based health and status HTTP server.
pub struct HealthServer {
    /// Coordinator whose status is reported.
    coordinator: Arc<StreamCoordinator>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub const fn new(coordinator: Arc<StreamCoordinator>, port: u16) -> Self {
        Self { coordinator, port }
    }

    /// Routes served by this server.
    pub fn router(coordinator: Arc<StreamCoordinator>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/status", get(Self::status))
            .route("/alerts", get(Self::alerts))
            .route("/alerts/:id/ack", post(Self::acknowledge))
            .with_state(coordinator)
    }

    /// Serve until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.coordinator));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }

    /// Liveness check: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness check: returns 200 only if a stream is open.
    async fn readiness(State(coordinator): State<Arc<StreamCoordinator>>) -> impl IntoResponse {
        if coordinator.registry().connected_count() > 0 {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn status(State(coordinator): State<Arc<StreamCoordinator>>) -> impl IntoResponse {
        Json(coordinator.status())
    }

    async fn alerts(State(coordinator): State<Arc<StreamCoordinator>>) -> impl IntoResponse {
        Json(coordinator.unacknowledged())
    }

    async fn acknowledge(
        State(coordinator): State<Arc<StreamCoordinator>>,
        Path(id): Path<String>,
    ) -> StatusCode {
        if coordinator.acknowledge(&id) {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::feeds::ChannelDialer;
    use crate::domain::observation::Observation;
    use serde_json::json;

    fn coordinator() -> Arc<StreamCoordinator> {
        Arc::new(StreamCoordinator::builder(Arc::new(ChannelDialer::new())).build())
    }

    #[tokio::test]
    async fn test_not_ready_without_open_streams() {
        let response = HealthServer::readiness(State(coordinator())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = HealthServer::liveness().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_acknowledge_endpoint() {
        let coordinator = coordinator();
        coordinator.ingest(Observation::new("system_health", json!({ "status": "down" })));
        let id = coordinator.unacknowledged()[0].id.clone();

        let found = HealthServer::acknowledge(State(Arc::clone(&coordinator)), Path(id)).await;
        assert_eq!(found, StatusCode::NO_CONTENT);

        let missing =
            HealthServer::acknowledge(State(coordinator), Path("nope".to_string())).await;
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }
}
