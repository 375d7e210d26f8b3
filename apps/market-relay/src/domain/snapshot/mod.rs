//! Snapshot Cache
//!
//! The authoritative in-memory view of the latest known state per symbol.
//!
//! # Write paths
//!
//! - [`Snapshot::apply_partial_update`]: live events, merged field by field.
//! - [`Snapshot::bulk_load`]: scheduled/startup refresh, replaces whole records
//!   for one group at a time.
//!
//! # Consistency
//!
//! All state sits behind one `RwLock`. A partial update holds the write guard
//! for a single symbol merge and a bulk load holds it for a single group, so
//! readers never see a half-applied update or a half-replaced group. A full
//! refresh walks the groups one after another with network calls in between,
//! so during a refresh some groups may already hold the new generation while
//! others still hold the old one. That window is accepted: each group is
//! consistent with itself, and the whole cache converges once the refresh
//! completes.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::market::{Group, MarketState, PartialUpdate, Symbol};

// =============================================================================
// Status Types
// =============================================================================

/// Refresh and update counters for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Group identifier.
    pub group: Group,
    /// Symbols in the group's current membership.
    pub symbol_count: usize,
    /// Completed bulk loads of this group.
    pub bulk_loads: u64,
    /// Time of the last bulk load.
    pub last_loaded_at: Option<DateTime<Utc>>,
    /// Live partial updates applied to members of this group.
    pub live_updates: u64,
    /// Time of the last live update to a member.
    pub last_live_update_at: Option<DateTime<Utc>>,
}

/// Read-only view of the snapshot's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStatus {
    /// At least one group member and one market state are known.
    pub ready: bool,
    /// Number of symbols with a market state.
    pub symbol_count: usize,
    /// Total live partial updates applied.
    pub live_updates: u64,
    /// Per-group counters, in [`Group::all`] order.
    pub groups: Vec<GroupStatus>,
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Default)]
struct GroupEntry {
    symbols: Vec<Symbol>,
    bulk_loads: u64,
    last_loaded_at: Option<DateTime<Utc>>,
    live_updates: u64,
    last_live_update_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SnapshotInner {
    states: HashMap<Symbol, MarketState>,
    groups: HashMap<Group, GroupEntry>,
    /// Reverse of `groups[*].symbols`, for attributing live updates.
    memberships: HashMap<Symbol, Vec<Group>>,
    live_updates: u64,
}

/// Shared per-symbol market state store.
///
/// # Example
///
/// ```rust
/// use market_relay::domain::market::{Group, MarketState};
/// use market_relay::domain::snapshot::Snapshot;
///
/// let snapshot = Snapshot::new();
/// snapshot.bulk_load(Group::Hose, vec![MarketState::new("VIC")]);
///
/// assert_eq!(snapshot.get_by_group(Group::Hose).len(), 1);
/// assert!(snapshot.get_by_group(Group::Hnx).is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Snapshot {
    inner: RwLock<SnapshotInner>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an update into the symbol's state, creating the state if needed.
    pub fn apply_partial_update(&self, symbol: &str, update: &impl PartialUpdate) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let inner = &mut *inner;

        let state = inner
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| MarketState::new(symbol));
        update.merge_into(state);

        inner.live_updates += 1;
        if let Some(groups) = inner.memberships.get(symbol) {
            for group in groups {
                if let Some(entry) = inner.groups.get_mut(group) {
                    entry.live_updates += 1;
                    entry.last_live_update_at = Some(now);
                }
            }
        }
    }

    /// Replace the full state of every symbol in `states` and set the group's
    /// membership to those symbols, in order.
    ///
    /// Fields present before the load but absent from the new record are gone
    /// afterwards. Returns the number of symbols loaded.
    pub fn bulk_load(&self, group: Group, states: Vec<MarketState>) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let inner = &mut *inner;

        let mut seen = HashSet::with_capacity(states.len());
        let mut members = Vec::with_capacity(states.len());
        for state in states {
            if seen.insert(state.symbol.clone()) {
                members.push(state.symbol.clone());
            }
            inner.states.insert(state.symbol.clone(), state);
        }

        let entry = inner.groups.entry(group).or_default();
        for old in &entry.symbols {
            if let Some(groups) = inner.memberships.get_mut(old) {
                groups.retain(|g| *g != group);
            }
        }
        for symbol in &members {
            let groups = inner.memberships.entry(symbol.clone()).or_default();
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        inner.memberships.retain(|_, groups| !groups.is_empty());

        entry.symbols = members;
        entry.bulk_loads += 1;
        entry.last_loaded_at = Some(now);

        entry.symbols.len()
    }

    /// State of one symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<MarketState> {
        self.inner.read().states.get(symbol).cloned()
    }

    /// States of the requested symbols, in request order. Unknown symbols are
    /// skipped.
    #[must_use]
    pub fn get_by_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<MarketState> {
        let inner = self.inner.read();
        symbols
            .iter()
            .filter_map(|s| inner.states.get(s.as_ref()).cloned())
            .collect()
    }

    /// States of a group's members, in membership order. A group that has not
    /// been loaded yields an empty list.
    #[must_use]
    pub fn get_by_group(&self, group: Group) -> Vec<MarketState> {
        let inner = self.inner.read();
        inner.groups.get(&group).map_or_else(Vec::new, |entry| {
            entry
                .symbols
                .iter()
                .filter_map(|s| inner.states.get(s).cloned())
                .collect()
        })
    }

    /// Every known state, sorted by symbol.
    #[must_use]
    pub fn get_all(&self) -> Vec<MarketState> {
        let mut all: Vec<_> = self.inner.read().states.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Every symbol the snapshot tracks (group members and symbols seen on the
    /// live feed), sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        let inner = self.inner.read();
        let mut symbols: Vec<_> = inner
            .states
            .keys()
            .chain(inner.memberships.keys())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        symbols.sort();
        symbols
    }

    /// Whether at least one group member and one market state are known.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let inner = self.inner.read();
        Self::ready(&inner)
    }

    /// Status counters for the operator surface.
    #[must_use]
    pub fn status(&self) -> SnapshotStatus {
        let inner = self.inner.read();
        let groups = Group::all()
            .iter()
            .map(|group| {
                let entry = inner.groups.get(group);
                GroupStatus {
                    group: *group,
                    symbol_count: entry.map_or(0, |e| e.symbols.len()),
                    bulk_loads: entry.map_or(0, |e| e.bulk_loads),
                    last_loaded_at: entry.and_then(|e| e.last_loaded_at),
                    live_updates: entry.map_or(0, |e| e.live_updates),
                    last_live_update_at: entry.and_then(|e| e.last_live_update_at),
                }
            })
            .collect();

        SnapshotStatus {
            ready: Self::ready(&inner),
            symbol_count: inner.states.len(),
            live_updates: inner.live_updates,
            groups,
        }
    }

    fn ready(inner: &SnapshotInner) -> bool {
        !inner.states.is_empty() && inner.groups.values().any(|e| !e.symbols.is_empty())
    }
}
