//! Application Layer - Use cases and port definitions.
//!
//! Ports describe what the relay needs from the outside world (a feed
//! transport, a bulk snapshot source, a fan-out publisher). Services wire
//! the domain to those ports.

/// Port interfaces implemented by infrastructure adapters.
pub mod ports;

/// Event orchestration and snapshot refresh.
pub mod services;
