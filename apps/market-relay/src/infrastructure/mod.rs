//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports, plus the HTTP
//! surfaces and process-wide concerns (config, metrics, telemetry).

/// Upstream feed client, frame codec and WebSocket transport.
pub mod feed;

/// HTTP client for the upstream bulk snapshot API.
pub mod snapshot_api;

/// Client registry and symbol-filtered fan-out.
pub mod broadcast;

/// Client WebSocket sessions and snapshot query endpoints.
pub mod api;

/// Configuration loaded from the environment.
pub mod config;

/// Health, status, metrics and operator endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry trace export.
pub mod telemetry;
