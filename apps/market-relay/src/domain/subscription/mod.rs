//! Subscription Tracking Types
//!
//! Domain types for tracking which downstream clients want which symbols.
//!
//! # Design
//!
//! Interest is tracked per [`SubscriptionKind`]. Each kind keeps two indexes
//! that must mirror each other exactly:
//!
//! - symbol → clients subscribed to it
//! - client → symbols it is subscribed to
//!
//! The forward index answers "who receives this event" during fan-out; the
//! reverse index makes disconnect cleanup proportional to the client's own
//! subscriptions. Neither index ever holds an empty set.
//!
//! The types here are plain data. The hub owns them behind its lock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::domain::market::{Channel, Symbol};

// =============================================================================
// Types
// =============================================================================

/// Opaque identifier for a connected downstream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle(u64);

impl ClientHandle {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Stream a client can subscribe to.
///
/// Index, put-through and advertised channels update the snapshot but are
/// not offered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionKind {
    /// Board-lot trade matches.
    MatchPrice,
    /// Board-lot order book.
    BidAsk,
    /// Odd-lot trade matches.
    MatchPriceOddLot,
    /// Odd-lot order book.
    BidAskOddLot,
}

impl SubscriptionKind {
    /// All kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::MatchPrice,
            Self::BidAsk,
            Self::MatchPriceOddLot,
            Self::BidAskOddLot,
        ]
    }

    /// The kind that delivers events from `channel`, if clients may
    /// subscribe to it.
    #[must_use]
    pub const fn for_channel(channel: Channel) -> Option<Self> {
        match channel {
            Channel::MatchPrice => Some(Self::MatchPrice),
            Channel::BidAsk => Some(Self::BidAsk),
            Channel::MatchPriceOddLot => Some(Self::MatchPriceOddLot),
            Channel::BidAskOddLot => Some(Self::BidAskOddLot),
            Channel::PutThrough | Channel::Advertised | Channel::Index => None,
        }
    }

    /// Channel whose name the kind shares on the wire.
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::MatchPrice => Channel::MatchPrice,
            Self::BidAsk => Channel::BidAsk,
            Self::MatchPriceOddLot => Channel::MatchPriceOddLot,
            Self::BidAskOddLot => Channel::BidAskOddLot,
        }
    }

    /// Wire name, same as the channel's.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.channel().as_str()
    }
}

impl FromStr for SubscriptionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::parse(s)
            .and_then(Self::for_channel)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Returned for a kind name that clients cannot subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subscription kind: {0}")]
pub struct UnknownKind(pub String);

// =============================================================================
// Interest Index (per subscription kind)
// =============================================================================

/// Paired symbol ↔ client indexes for one subscription kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterestIndex {
    by_symbol: HashMap<Symbol, HashSet<ClientHandle>>,
    by_client: HashMap<ClientHandle, HashSet<Symbol>>,
}

impl InterestIndex {
    /// Add interest. Returns the symbols that were newly added for the client.
    pub fn subscribe<S: AsRef<str>>(&mut self, client: ClientHandle, symbols: &[S]) -> Vec<Symbol> {
        let mut added = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref();
            let client_set = self.by_client.entry(client).or_default();
            if !client_set.insert(symbol.to_string()) {
                continue;
            }
            self.by_symbol
                .entry(symbol.to_string())
                .or_default()
                .insert(client);
            added.push(symbol.to_string());
        }
        if self.by_client.get(&client).is_some_and(HashSet::is_empty) {
            self.by_client.remove(&client);
        }
        added
    }

    /// Remove interest. Symbols the client was not subscribed to are ignored.
    /// Returns the symbols actually removed.
    pub fn unsubscribe<S: AsRef<str>>(
        &mut self,
        client: ClientHandle,
        symbols: &[S],
    ) -> Vec<Symbol> {
        let Some(client_set) = self.by_client.get_mut(&client) else {
            return vec![];
        };

        let mut removed = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref();
            if !client_set.remove(symbol) {
                continue;
            }
            Self::detach(&mut self.by_symbol, symbol, client);
            removed.push(symbol.to_string());
        }

        if client_set.is_empty() {
            self.by_client.remove(&client);
        }
        removed
    }

    /// Drop every subscription held by `client`. Returns how many were removed.
    pub fn remove_client(&mut self, client: ClientHandle) -> usize {
        let Some(symbols) = self.by_client.remove(&client) else {
            return 0;
        };
        for symbol in &symbols {
            Self::detach(&mut self.by_symbol, symbol, client);
        }
        symbols.len()
    }

    /// Clients subscribed to `symbol`.
    #[must_use]
    pub fn subscribers(&self, symbol: &str) -> Option<&HashSet<ClientHandle>> {
        self.by_symbol.get(symbol)
    }

    /// Symbols `client` is subscribed to, sorted.
    #[must_use]
    pub fn symbols_for(&self, client: ClientHandle) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self
            .by_client
            .get(&client)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        symbols.sort();
        symbols
    }

    /// Clients holding at least one subscription.
    pub fn clients(&self) -> impl Iterator<Item = ClientHandle> + '_ {
        self.by_client.keys().copied()
    }

    /// Whether `client` holds at least one subscription.
    #[must_use]
    pub fn knows_client(&self, client: ClientHandle) -> bool {
        self.by_client.contains_key(&client)
    }

    /// Counters for the status surface.
    #[must_use]
    pub fn stats(&self) -> InterestStats {
        InterestStats {
            symbol_count: self.by_symbol.len(),
            client_count: self.by_client.len(),
            subscription_count: self.by_client.values().map(HashSet::len).sum(),
        }
    }

    /// Whether the two indexes mirror each other and hold no empty sets.
    #[must_use]
    pub fn check_invariant(&self) -> bool {
        let forward_ok = self.by_symbol.iter().all(|(symbol, clients)| {
            !clients.is_empty()
                && clients
                    .iter()
                    .all(|c| self.by_client.get(c).is_some_and(|s| s.contains(symbol)))
        });
        let reverse_ok = self.by_client.iter().all(|(client, symbols)| {
            !symbols.is_empty()
                && symbols
                    .iter()
                    .all(|s| self.by_symbol.get(s).is_some_and(|c| c.contains(client)))
        });
        forward_ok && reverse_ok
    }

    fn detach(
        by_symbol: &mut HashMap<Symbol, HashSet<ClientHandle>>,
        symbol: &str,
        client: ClientHandle,
    ) {
        if let Some(clients) = by_symbol.get_mut(symbol) {
            clients.remove(&client);
            if clients.is_empty() {
                by_symbol.remove(symbol);
            }
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters for a single subscription kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterestStats {
    /// Symbols with at least one subscriber.
    pub symbol_count: usize,
    /// Clients with at least one subscription.
    pub client_count: usize,
    /// Total (client, symbol) pairs.
    pub subscription_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
