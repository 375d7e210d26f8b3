//! Live Event Orchestrator
//!
//! Composes the snapshot and the fan-out publisher behind the feed client's
//! [`EventSink`]. Every event is merged into the snapshot first and published
//! second, so a client reacting to a pushed event and querying the snapshot
//! never reads state older than that event.

use std::sync::Arc;
use std::time::Instant;

use crate::application::ports::{EventPublisher, EventSink};
use crate::domain::market::MarketEvent;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::metrics;

/// Wires decoded events into the snapshot and the hub, in that order.
pub struct Orchestrator {
    snapshot: Arc<Snapshot>,
    publisher: Arc<dyn EventPublisher>,
}

impl Orchestrator {
    /// Create an orchestrator over shared snapshot and publisher instances.
    #[must_use]
    pub fn new(snapshot: Arc<Snapshot>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            snapshot,
            publisher,
        }
    }
}

impl EventSink for Orchestrator {
    fn on_event(&self, event: MarketEvent) {
        let started = Instant::now();
        self.snapshot.apply_partial_update(event.symbol(), &event);
        let delivered = self.publisher.publish(&event);
        metrics::record_processing_duration(event.channel(), started.elapsed());
        tracing::trace!(
            symbol = event.symbol(),
            channel = event.channel().as_str(),
            delivered,
            "Event applied"
        );
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}
