//! Market Relay Binary
//!
//! Starts the upstream feed client, the snapshot refresh loop and the client
//! and health HTTP servers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_RELAY_FEED_URL`: upstream WebSocket URL
//!
//! ## Optional
//! - `MARKET_RELAY_SNAPSHOT_API_URL`: bulk snapshot API (unset disables refresh)
//! - `MARKET_RELAY_API_PORT`: client WebSocket and query port (default: 8080)
//! - `MARKET_RELAY_HEALTH_PORT`: health, status and metrics port (default: 8082)
//! - `MARKET_RELAY_RECONNECT_DELAY_MS`: fixed retry delay (default: 3000)
//! - `MARKET_RELAY_MAX_RECONNECT_ATTEMPTS`: attempts before giving up (default: 10)
//! - `MARKET_RELAY_CONNECT_TIMEOUT_SECS`: connect timeout (default: 10)
//! - `MARKET_RELAY_REFRESH_INTERVAL_SECS`: refresh period (default: 300)
//! - `MARKET_RELAY_REFRESH_TIMEOUT_SECS`: refresh request timeout (default: 15)
//! - `MARKET_RELAY_CLIENT_BUFFER`: per-client outbound queue (default: 1024)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: trace export
//! - `RUST_LOG`: Log level (default: `market_relay=info`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_relay::infrastructure::telemetry;
use market_relay::{
    ApiServer, ApiState, BroadcastHub, FeedClient, HealthServer, HealthServerState,
    HttpSnapshotSource, Orchestrator, RefreshService, RelayConfig, Snapshot, WsTransport,
    init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fails only if a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        trace_export = telemetry_guard.is_exporting(),
        "Starting market relay"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Core state
    let snapshot = Arc::new(Snapshot::new());
    let hub = Arc::new(BroadcastHub::new(config.broadcast));
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&snapshot), hub.clone()));

    // Initial bulk load, then scheduled refresh
    if let Some(api) = &config.snapshot_api {
        let source = HttpSnapshotSource::new(api).context("failed to build snapshot API client")?;
        let refresh = Arc::new(RefreshService::new(Arc::new(source), Arc::clone(&snapshot)));

        match refresh.refresh_all().await {
            Ok(report) => tracing::info!(
                groups = report.groups.len(),
                symbols = report.total_symbols(),
                "Initial snapshot loaded"
            ),
            Err(e) => tracing::warn!(error = %e, "Initial snapshot incomplete; starting anyway"),
        }

        tasks.push(tokio::spawn(
            Arc::clone(&refresh).run(api.refresh_interval, shutdown_token.clone()),
        ));
    } else {
        tracing::warn!("Snapshot API not configured; serving live updates only");
    }

    // Listeners are bound up front so a taken port fails startup.
    let api_listener = bind(config.server.api_port).await?;
    let health_listener = bind(config.server.health_port).await?;

    // Upstream feed
    let feed = Arc::new(FeedClient::new(
        config.feed.clone(),
        Arc::new(WsTransport::new(config.feed.url.clone())),
        snapshot.clone(),
        orchestrator,
        shutdown_token.clone(),
    ));
    tasks.push(tokio::spawn(Arc::clone(&feed).run()));

    // Client API
    let api_server = ApiServer::new(
        config.server.api_port,
        ApiState::new(Arc::clone(&snapshot), Arc::clone(&hub)),
        shutdown_token.clone(),
    );
    tracing::info!(port = config.server.api_port, "API server listening");
    tasks.push(tokio::spawn(async move {
        if let Err(e) = api_server.serve(api_listener).await {
            tracing::error!(error = %e, "API server error");
        }
    }));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&feed),
        Arc::clone(&hub),
        Arc::clone(&snapshot),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tracing::info!(port = config.server.health_port, "Health server listening");
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.serve(health_listener).await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    tracing::info!("Market relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, futures_util::future::join_all(tasks))
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out; exiting with tasks still running"
        );
    }

    tracing::info!("Market relay stopped");
    Ok(())
}

async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to port {port}"))
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        api_port = config.server.api_port,
        health_port = config.server.health_port,
        snapshot_api = config.snapshot_api.is_some(),
        client_buffer = config.broadcast.client_buffer,
        "Configuration loaded"
    );
    tracing::debug!(
        feed_url = %config.feed.url,
        reconnect_delay_ms = config.feed.reconnect_delay.as_millis(),
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        "Feed endpoint"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
