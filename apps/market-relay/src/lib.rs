#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Relay - Live Market Data Fan-out
//!
//! Maintains one connection to an upstream market-data feed, keeps an
//! in-memory snapshot of the latest state of every symbol, and relays live
//! events to WebSocket clients according to the symbols each one asked for.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Market types, snapshot cache and interest indexes
//!   - `market`: groups, channels, events and per-symbol state
//!   - `snapshot`: authoritative latest-state store
//!   - `subscription`: client/symbol interest tracking
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: feed transport, snapshot source, publisher and sink contracts
//!   - `services`: event orchestration and scheduled snapshot refresh
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: upstream client, frame codec and WebSocket transport
//!   - `snapshot_api`: HTTP client for bulk group snapshots
//!   - `broadcast`: client registry and symbol-filtered fan-out
//!   - `api`: client WebSocket sessions and snapshot queries
//!   - `health`: health, status, metrics and operator endpoints
//!   - `config`: environment configuration
//!
//! # Data Flow
//!
//! ```text
//!                 ┌─────────────┐    ┌──────────────┐    ┌─────────────┐
//! Upstream WS ───►│ FeedClient  │───►│ Orchestrator │───►│ BroadcastHub│──► Client 1
//!                 └─────────────┘    └──────┬───────┘    └─────────────┘──► Client N
//!                                           │ apply
//!                 ┌─────────────┐    ┌──────▼───────┐
//! Snapshot API ──►│  Refresh    │───►│   Snapshot   │◄── query API
//!                 └─────────────┘    └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market types and in-memory state, no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{Channel, Group, MarketEvent, MarketState, Symbol};
pub use domain::snapshot::{Snapshot, SnapshotStatus};
pub use domain::subscription::{ClientHandle, InterestIndex, SubscriptionKind};

// Application services
pub use application::services::{Orchestrator, RefreshError, RefreshReport, RefreshService};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FeedSettings, RelayConfig, ServerSettings,
    SnapshotApiSettings,
};

// Feed client
pub use infrastructure::feed::{ConnectionState, FeedClient, FeedStatus, WsTransport};

// Fan-out hub
pub use infrastructure::broadcast::{BroadcastHub, HubError, HubStats, SharedBroadcastHub};

// HTTP servers
pub use infrastructure::api::{ApiServer, ApiState, ServerError};
pub use infrastructure::health::{HealthServer, HealthServerState};

// Snapshot API client
pub use infrastructure::snapshot_api::HttpSnapshotSource;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
