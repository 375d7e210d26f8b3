//! Client Fan-out Hub
//!
//! Tracks connected downstream clients and their per-kind symbol interest,
//! and delivers each live event to exactly the clients that asked for it.
//!
//! # Architecture
//!
//! Every client gets a bounded `mpsc` queue created by [`BroadcastHub::connect`].
//! The hub keeps the sending half; the client's socket task drains the
//! receiving half.
//!
//! Publishing looks up the event's symbol in the interest index for the
//! event's kind. With no subscribers the call returns before serializing
//! anything. Otherwise the event is serialized once and the same
//! `Arc<str>` is queued for each subscriber. A full or closed queue skips that
//! client only.
//!
//! # Wire Format
//!
//! ```json
//! {"event":"matchPrice","data":{"symbol":"VIC","matchPrice":"45.1","matchVolume":100}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::BroadcastSettings;
use crate::application::ports::EventPublisher;
use crate::domain::market::{MarketEvent, Symbol};
use crate::domain::subscription::{
    ClientHandle, InterestIndex, InterestStats, SubscriptionKind,
};
use crate::infrastructure::metrics;

// =============================================================================
// Outbound Messages
// =============================================================================

/// A serialized message shared by every recipient of one event.
pub type OutboundMessage = Arc<str>;

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    data: &'a MarketEvent,
}

// =============================================================================
// Errors
// =============================================================================

/// Hub operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The handle is not (or no longer) connected.
    #[error("unknown client: {0}")]
    UnknownClient(ClientHandle),
}

// =============================================================================
// Broadcast Hub
// =============================================================================

#[derive(Debug, Default)]
struct HubState {
    clients: HashMap<ClientHandle, mpsc::Sender<OutboundMessage>>,
    match_price: InterestIndex,
    bid_ask: InterestIndex,
    match_price_odd_lot: InterestIndex,
    bid_ask_odd_lot: InterestIndex,
}

impl HubState {
    const fn index(&self, kind: SubscriptionKind) -> &InterestIndex {
        match kind {
            SubscriptionKind::MatchPrice => &self.match_price,
            SubscriptionKind::BidAsk => &self.bid_ask,
            SubscriptionKind::MatchPriceOddLot => &self.match_price_odd_lot,
            SubscriptionKind::BidAskOddLot => &self.bid_ask_odd_lot,
        }
    }

    const fn index_mut(&mut self, kind: SubscriptionKind) -> &mut InterestIndex {
        match kind {
            SubscriptionKind::MatchPrice => &mut self.match_price,
            SubscriptionKind::BidAsk => &mut self.bid_ask,
            SubscriptionKind::MatchPriceOddLot => &mut self.match_price_odd_lot,
            SubscriptionKind::BidAskOddLot => &mut self.bid_ask_odd_lot,
        }
    }
}

/// Registry of downstream clients and their subscriptions.
///
/// Connect, subscribe, unsubscribe and disconnect each take the write lock
/// once, so every index changes atomically with the client map. Publishing
/// takes the read lock.
///
/// # Example
///
/// ```rust
/// use market_relay::infrastructure::broadcast::BroadcastHub;
/// use market_relay::domain::subscription::SubscriptionKind;
///
/// let hub = BroadcastHub::with_defaults();
/// let (client, _rx) = hub.connect();
///
/// hub.subscribe(client, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();
/// assert_eq!(hub.stats().clients, 1);
///
/// hub.disconnect(client);
/// assert_eq!(hub.stats().clients, 0);
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    state: RwLock<HubState>,
    next_id: AtomicU64,
    client_buffer: usize,
    serializations: AtomicU64,
    deliveries: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub whose client queues hold `settings.client_buffer` messages.
    #[must_use]
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            next_id: AtomicU64::new(1),
            client_buffer: settings.client_buffer.max(1),
            serializations: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a hub with default settings.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastSettings::default())
    }

    // =========================================================================
    // Client Lifecycle
    // =========================================================================

    /// Register a new client. Returns its handle and the receiving end of
    /// its message queue.
    pub fn connect(&self) -> (ClientHandle, mpsc::Receiver<OutboundMessage>) {
        let handle = ClientHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.client_buffer);

        let count = {
            let mut state = self.state.write();
            state.clients.insert(handle, tx);
            state.clients.len()
        };
        metrics::set_clients(count);
        tracing::debug!(client = %handle, clients = count, "Client connected");

        (handle, rx)
    }

    /// Add interest in `symbols` for one kind. Already-held symbols are
    /// ignored. Returns the newly added symbols.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownClient`] if the handle is not connected.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        client: ClientHandle,
        kind: SubscriptionKind,
        symbols: &[S],
    ) -> Result<Vec<Symbol>, HubError> {
        let (added, stats) = {
            let mut state = self.state.write();
            if !state.clients.contains_key(&client) {
                return Err(HubError::UnknownClient(client));
            }
            let index = state.index_mut(kind);
            let added = index.subscribe(client, symbols);
            (added, index.stats())
        };
        metrics::set_subscriptions(kind, stats.subscription_count);
        tracing::debug!(client = %client, kind = kind.as_str(), added = added.len(), "Subscribed");
        Ok(added)
    }

    /// Remove interest in `symbols` for one kind. Symbols the client was not
    /// subscribed to are ignored. Returns the symbols removed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownClient`] if the handle is not connected.
    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        client: ClientHandle,
        kind: SubscriptionKind,
        symbols: &[S],
    ) -> Result<Vec<Symbol>, HubError> {
        let (removed, stats) = {
            let mut state = self.state.write();
            if !state.clients.contains_key(&client) {
                return Err(HubError::UnknownClient(client));
            }
            let index = state.index_mut(kind);
            let removed = index.unsubscribe(client, symbols);
            (removed, index.stats())
        };
        metrics::set_subscriptions(kind, stats.subscription_count);
        tracing::debug!(client = %client, kind = kind.as_str(), removed = removed.len(), "Unsubscribed");
        Ok(removed)
    }

    /// Remove a client and all of its subscriptions. Returns `false` if the
    /// handle was unknown.
    pub fn disconnect(&self, client: ClientHandle) -> bool {
        let mut per_kind = Vec::with_capacity(SubscriptionKind::all().len());
        let (known, count) = {
            let mut state = self.state.write();
            let known = state.clients.remove(&client).is_some();
            for kind in SubscriptionKind::all() {
                let index = state.index_mut(*kind);
                if index.remove_client(client) > 0 {
                    per_kind.push((*kind, index.stats().subscription_count));
                }
            }
            (known, state.clients.len())
        };

        if known {
            metrics::set_clients(count);
            for (kind, subs) in per_kind {
                metrics::set_subscriptions(kind, subs);
            }
            tracing::debug!(client = %client, clients = count, "Client disconnected");
        }
        known
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Deliver an event to its subscribers. Returns the number of clients
    /// the message was queued for.
    ///
    /// Events whose channel has no [`SubscriptionKind`] are never delivered.
    pub fn publish(&self, event: &MarketEvent) -> usize {
        let channel = event.channel();
        let Some(kind) = SubscriptionKind::for_channel(channel) else {
            return 0;
        };

        let state = self.state.read();
        let Some(subscribers) = state.index(kind).subscribers(event.symbol()) else {
            return 0;
        };

        let payload: OutboundMessage = match serde_json::to_string(&Envelope {
            event: channel.as_str(),
            data: event,
        }) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::warn!(error = %e, symbol = event.symbol(), "Failed to serialize event");
                return 0;
            }
        };
        self.serializations.fetch_add(1, Ordering::Relaxed);
        metrics::record_serialization(channel);

        let mut sent = 0_usize;
        let mut dropped = 0_u64;
        for client in subscribers {
            let queued = state
                .clients
                .get(client)
                .is_some_and(|tx| tx.try_send(Arc::clone(&payload)).is_ok());
            if queued {
                sent += 1;
            } else {
                dropped += 1;
            }
        }
        drop(state);

        self.deliveries.fetch_add(sent as u64, Ordering::Relaxed);
        metrics::record_messages_sent(channel, sent as u64);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            metrics::record_messages_dropped(channel, dropped);
            tracing::debug!(symbol = event.symbol(), dropped, "Skipped slow or closed clients");
        }
        sent
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Symbols `client` is subscribed to for `kind`, sorted.
    #[must_use]
    pub fn client_symbols(&self, client: ClientHandle, kind: SubscriptionKind) -> Vec<Symbol> {
        self.state.read().index(kind).symbols_for(client)
    }

    /// Whether every per-kind index is internally consistent and only
    /// references connected clients.
    #[must_use]
    pub fn check_invariant(&self) -> bool {
        let state = self.state.read();
        SubscriptionKind::all().iter().all(|kind| {
            let index = state.index(*kind);
            index.check_invariant() && index.clients().all(|c| state.clients.contains_key(&c))
        })
    }

    /// Snapshot of hub counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.read();
        HubStats {
            clients: state.clients.len(),
            match_price: state.match_price.stats(),
            bid_ask: state.bid_ask.stats(),
            match_price_odd_lot: state.match_price_odd_lot.stats(),
            bid_ask_odd_lot: state.bid_ask_odd_lot.stats(),
            serializations: self.serializations.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, event: &MarketEvent) -> usize {
        Self::publish(self, event)
    }
}

/// Shared hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Connected clients.
    pub clients: usize,
    /// Board-lot match interest.
    pub match_price: InterestStats,
    /// Board-lot book interest.
    pub bid_ask: InterestStats,
    /// Odd-lot match interest.
    pub match_price_odd_lot: InterestStats,
    /// Odd-lot book interest.
    pub bid_ask_odd_lot: InterestStats,
    /// Events serialized for delivery.
    pub serializations: u64,
    /// Messages queued to clients.
    pub deliveries: u64,
    /// Messages skipped for full or closed queues.
    pub dropped: u64,
}

impl HubStats {
    /// Total (client, symbol) pairs across kinds.
    #[must_use]
    pub const fn total_subscriptions(&self) -> usize {
        self.match_price.subscription_count
            + self.bid_ask.subscription_count
            + self.match_price_odd_lot.subscription_count
            + self.bid_ask_odd_lot.subscription_count
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::market::{BidAsk, IndexUpdate, MatchPrice, PriceLevel};

    fn match_price(symbol: &str) -> MarketEvent {
        MarketEvent::MatchPrice(MatchPrice {
            symbol: symbol.to_string(),
            match_price: Decimal::new(451, 1),
            match_volume: 100,
            total_volume: None,
            total_value: None,
            open: None,
            high: None,
            low: None,
            change: None,
            change_percent: None,
            foreign_buy_volume: None,
            foreign_sell_volume: None,
            foreign_room: None,
            time: None,
        })
    }

    fn bid_ask(symbol: &str) -> MarketEvent {
        MarketEvent::BidAsk(BidAsk {
            symbol: symbol.to_string(),
            bids: Some(vec![PriceLevel { price: Decimal::from(45), volume: 10 }]),
            asks: None,
            time: None,
        })
    }

    #[test]
    fn publish_without_subscribers_skips_serialization() {
        let hub = BroadcastHub::with_defaults();
        let (_client, _rx) = hub.connect();

        assert_eq!(hub.publish(&match_price("VIC")), 0);
        assert_eq!(hub.stats().serializations, 0);
    }

    #[tokio::test]
    async fn publish_serializes_once_for_many_clients() {
        let hub = BroadcastHub::with_defaults();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        hub.subscribe(a, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();
        hub.subscribe(b, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();

        assert_eq!(hub.publish(&match_price("VIC")), 2);

        let ma = rx_a.recv().await.unwrap();
        let mb = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&ma, &mb));

        let json: serde_json::Value = serde_json::from_str(&ma).unwrap();
        assert_eq!(json["event"], "matchPrice");
        assert_eq!(json["data"]["symbol"], "VIC");

        let stats = hub.stats();
        assert_eq!(stats.serializations, 1);
        assert_eq!(stats.deliveries, 2);
    }

    #[tokio::test]
    async fn interest_is_per_kind() {
        let hub = BroadcastHub::with_defaults();
        let (client, mut rx) = hub.connect();
        hub.subscribe(client, SubscriptionKind::BidAsk, &["VIC"]).unwrap();

        assert_eq!(hub.publish(&match_price("VIC")), 0);
        assert_eq!(hub.publish(&bid_ask("VIC")), 1);

        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("\"event\":\"bidAsk\""));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn index_events_are_never_fanned_out() {
        let hub = BroadcastHub::with_defaults();
        let (client, _rx) = hub.connect();
        for kind in SubscriptionKind::all() {
            hub.subscribe(client, *kind, &["VNINDEX"]).unwrap();
        }
        let event = MarketEvent::Index(IndexUpdate {
            symbol: "VNINDEX".into(),
            value: Decimal::from(1250),
            change: None,
            change_percent: None,
            total_volume: None,
            total_value: None,
            advances: None,
            declines: None,
            unchanged: None,
            time: None,
        });
        assert_eq!(hub.publish(&event), 0);
        assert_eq!(hub.stats().serializations, 0);
    }

    #[test]
    fn full_queue_skips_only_that_client() {
        let hub = BroadcastHub::new(BroadcastSettings { client_buffer: 1 });
        let (slow, _slow_rx) = hub.connect();
        let (fast, mut fast_rx) = hub.connect();
        hub.subscribe(slow, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();
        hub.subscribe(fast, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();

        assert_eq!(hub.publish(&match_price("VIC")), 2);
        fast_rx.try_recv().unwrap();
        assert_eq!(hub.publish(&match_price("VIC")), 1);
        assert_eq!(hub.stats().dropped, 1);
    }

    #[test]
    fn closed_receiver_is_skipped() {
        let hub = BroadcastHub::with_defaults();
        let (client, rx) = hub.connect();
        hub.subscribe(client, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();
        drop(rx);

        assert_eq!(hub.publish(&match_price("VIC")), 0);
    }

    #[test]
    fn subscribe_unknown_client_fails() {
        let hub = BroadcastHub::with_defaults();
        let ghost = ClientHandle::new(99);
        assert_eq!(
            hub.subscribe(ghost, SubscriptionKind::MatchPrice, &["VIC"]),
            Err(HubError::UnknownClient(ghost))
        );
    }

    #[test]
    fn disconnect_removes_all_interest() {
        let hub = BroadcastHub::with_defaults();
        let (client, _rx) = hub.connect();
        hub.subscribe(client, SubscriptionKind::MatchPrice, &["VIC", "VHM"]).unwrap();
        hub.subscribe(client, SubscriptionKind::BidAskOddLot, &["VIC"]).unwrap();

        assert!(hub.disconnect(client));
        assert!(!hub.disconnect(client));

        let stats = hub.stats();
        assert_eq!(stats.clients, 0);
        assert_eq!(stats.total_subscriptions(), 0);
        assert!(hub.check_invariant());
        assert_eq!(hub.publish(&match_price("VIC")), 0);
    }

    #[test]
    fn client_symbols_lists_per_kind() {
        let hub = BroadcastHub::with_defaults();
        let (client, _rx) = hub.connect();
        hub.subscribe(client, SubscriptionKind::MatchPrice, &["VIC", "FPT"]).unwrap();
        hub.unsubscribe(client, SubscriptionKind::MatchPrice, &["VIC"]).unwrap();

        assert_eq!(hub.client_symbols(client, SubscriptionKind::MatchPrice), ["FPT"]);
        assert!(hub.client_symbols(client, SubscriptionKind::BidAsk).is_empty());
    }

    #[test]
    fn handles_are_unique() {
        let hub = BroadcastHub::with_defaults();
        let (a, _ra) = hub.connect();
        let (b, _rb) = hub.connect();
        assert_ne!(a, b);
    }
}
