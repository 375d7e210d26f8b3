//! Client API Server
//!
//! The client-facing HTTP surface on the API port:
//!
//! - `GET /ws` - WebSocket session for live, symbol-filtered events
//! - `GET /api/v1/snapshots?symbols=A,B` - latest state for listed symbols
//! - `GET /api/v1/groups/{group}/snapshots` - latest state for a group
//! - `GET /api/v1/snapshots/all` - every known symbol

mod query;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::snapshot::Snapshot;
use crate::infrastructure::broadcast::SharedBroadcastHub;

pub use session::{ClientCommand, CommandError, CommandReply, handle_command};

/// Shared state for API handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    /// Snapshot read by the query endpoints.
    pub snapshot: Arc<Snapshot>,
    /// Hub that WebSocket sessions register with.
    pub hub: SharedBroadcastHub,
}

impl ApiState {
    /// Bundle the snapshot and hub.
    #[must_use]
    pub const fn new(snapshot: Arc<Snapshot>, hub: SharedBroadcastHub) -> Self {
        Self { snapshot, hub }
    }
}

/// Build the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/ws", get(session::ws_handler))
        .route("/api/v1/snapshots", get(query::by_symbols))
        .route("/api/v1/snapshots/all", get(query::all))
        .route("/api/v1/groups/{group}/snapshots", get(query::by_group))
        .with_state(state)
}

/// HTTP server failures shared by the API and health servers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// Client API server.
pub struct ApiServer {
    port: u16,
    state: ApiState,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: ApiState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops with an error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");
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

        tracing::info!("API server stopped");
        Ok(())
    }
}
