//! Domain Layer - Market state, snapshot cache and subscription tracking.
//!
//! This layer holds the relay's core types with no I/O. Everything here is
//! synchronous and safe to share across tasks behind an `Arc`.

/// Market data types: symbols, groups, channels, events and per-symbol state.
pub mod market;

/// Authoritative in-memory snapshot of the latest state per symbol.
pub mod snapshot;

/// Client/symbol interest indexes used by the fan-out hub.
pub mod subscription;
