//! Event Sink Port (Driver Port)
//!
//! How the feed client hands decoded events to the rest of the relay.

use crate::domain::market::{MarketEvent, Symbol};
use crate::domain::snapshot::Snapshot;

/// Receives decoded upstream events.
///
/// The feed client calls `on_event` inline from its read loop, one event at
/// a time in arrival order. Implementations must not block for long; slow
/// work stalls the feed.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: MarketEvent);
}

/// Source of the symbols the upstream subscription must cover.
pub trait SymbolUniverse: Send + Sync {
    /// Every symbol to subscribe upstream.
    fn symbols(&self) -> Vec<Symbol>;
}

impl SymbolUniverse for Snapshot {
    fn symbols(&self) -> Vec<Symbol> {
        Self::symbols(self)
    }
}

/// Fixed symbol list, for tests and static deployments.
impl SymbolUniverse for Vec<Symbol> {
    fn symbols(&self) -> Vec<Symbol> {
        self.clone()
    }
}
