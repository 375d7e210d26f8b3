//! Health, Status and Metrics Endpoint
//!
//! HTTP endpoint for health checks, status reporting, Prometheus metrics and
//! operator commands. Used by container orchestrators, load balancers and
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health summary
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (snapshot has data)
//! - `GET /status` - Feed, hub and snapshot counters
//! - `GET /metrics` - Prometheus metrics in text format
//! - `POST /feed/reconnect` - Reset the feed's attempt budget and reconnect

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::snapshot::{Snapshot, SnapshotStatus};
use crate::infrastructure::api::ServerError;
use crate::infrastructure::broadcast::{HubStats, SharedBroadcastHub};
use crate::infrastructure::feed::{ConnectionState, FeedClient, FeedStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection state.
    pub feed: ConnectionState,
    /// Whether the snapshot can serve reads.
    pub snapshot_ready: bool,
    /// Connected downstream clients.
    pub clients: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed subscribed and snapshot populated.
    Healthy,
    /// Serving, but either live data or the snapshot is missing.
    Degraded,
    /// Feed gave up, or nothing can be served.
    Unhealthy,
}

/// Full status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Upstream feed.
    pub feed: FeedStatus,
    /// Downstream fan-out.
    pub hub: HubStats,
    /// Snapshot cache.
    pub snapshot: SnapshotStatus,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: Arc<FeedClient>,
    hub: SharedBroadcastHub,
    snapshot: Arc<Snapshot>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed: Arc<FeedClient>,
        hub: SharedBroadcastHub,
        snapshot: Arc<Snapshot>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            hub,
            snapshot,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/feed/reconnect", post(reconnect_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.snapshot.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn status_handler(State(state): State<Arc<HealthServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        feed: state.feed.status(),
        hub: state.hub.stats(),
        snapshot: state.snapshot.status(),
    })
}

async fn reconnect_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    state.feed.reconnect();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "reconnecting" })),
    )
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.state().get_state();
    let snapshot_ready = state.snapshot.is_ready();

    HealthResponse {
        status: determine_health_status(feed, snapshot_ready),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        snapshot_ready,
        clients: state.hub.stats().clients,
    }
}

const fn determine_health_status(feed: ConnectionState, snapshot_ready: bool) -> HealthStatus {
    match (feed, snapshot_ready) {
        (ConnectionState::Exhausted, _) => HealthStatus::Unhealthy,
        (ConnectionState::Subscribed, true) => HealthStatus::Healthy,
        (ConnectionState::Subscribed | ConnectionState::Connected, false) | (_, true) => {
            HealthStatus::Degraded
        }
        (_, false) => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Tests
// =============================================================================
