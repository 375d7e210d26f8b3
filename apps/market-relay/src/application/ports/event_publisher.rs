//! Event Publisher Port (Driven Port)
//!
//! Delivery of live events to downstream clients.

use crate::domain::market::MarketEvent;

/// Fans a live event out to interested clients.
pub trait EventPublisher: Send + Sync {
    /// Deliver `event` to every client subscribed to its symbol and kind.
    /// Returns the number of clients the message was queued for.
    fn publish(&self, event: &MarketEvent) -> usize;
}
