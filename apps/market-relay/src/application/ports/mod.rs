//! Port Interfaces
//!
//! Contracts between the relay's services and the outside world, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedTransport`] / [`FeedConnection`]: byte-level link to the upstream feed
//! - [`SnapshotSource`]: bulk snapshot query API, one group per call
//! - [`EventPublisher`]: downstream fan-out of live events
//!
//! ## Driver Ports (Inbound)
//!
//! - [`EventSink`]: receives each decoded upstream event, in order
//! - [`SymbolUniverse`]: symbols the upstream subscription must cover

mod event_publisher;
mod event_sink;
mod feed_transport;
mod snapshot_source;

pub use event_publisher::EventPublisher;
pub use event_sink::{EventSink, SymbolUniverse};
pub use feed_transport::{FeedConnection, FeedTransport, TransportError};
pub use snapshot_source::{SnapshotSource, SnapshotSourceError};

#[cfg(test)]
pub use snapshot_source::MockSnapshotSource;
