//! Per-Symbol Market State
//!
//! The record the snapshot keeps for each symbol. Every field is optional:
//! a field is present once some event or bulk load has set it, and stays at
//! its last value until another write touches that same field.
//!
//! The same shape is used on the bulk-load path (JSON from the upstream query
//! API) and on the read path (JSON to query clients).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::events::PriceLevel;

/// Latest known values for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    /// Ticker or index code.
    pub symbol: String,

    // --- Session reference prices -----------------------------------------
    /// Reference (previous close) price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_price: Option<Decimal>,
    /// Ceiling price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<Decimal>,
    /// Floor price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<Decimal>,

    // --- Board-lot matching -----------------------------------------------
    /// Session open price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// Session high.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Session low.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Last matched price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    /// Volume of the last match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_volume: Option<i64>,
    /// Change against the reference price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Percentage change against the reference price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
    /// Accumulated matched volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<i64>,
    /// Accumulated matched value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Decimal>,
    /// Exchange time of the last match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_time: Option<String>,

    // --- Board-lot order book ---------------------------------------------
    /// Best bid levels, best first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bids: Option<Vec<PriceLevel>>,
    /// Best ask levels, best first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asks: Option<Vec<PriceLevel>>,

    // --- Foreign investor counters ----------------------------------------
    /// Accumulated foreign buy volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_buy_volume: Option<i64>,
    /// Accumulated foreign sell volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_sell_volume: Option<i64>,
    /// Remaining foreign ownership room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_room: Option<i64>,

    // --- Odd-lot board ----------------------------------------------------
    /// Last odd-lot matched price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odd_lot_last_price: Option<Decimal>,
    /// Volume of the last odd-lot match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odd_lot_last_volume: Option<i64>,
    /// Accumulated odd-lot volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odd_lot_total_volume: Option<i64>,
    /// Odd-lot bid levels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odd_lot_bids: Option<Vec<PriceLevel>>,
    /// Odd-lot ask levels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odd_lot_asks: Option<Vec<PriceLevel>>,

    // --- Negotiated trades ------------------------------------------------
    /// Price of the last put-through trade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_through_price: Option<Decimal>,
    /// Volume of the last put-through trade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_through_volume: Option<i64>,
    /// Accumulated put-through volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_through_total_volume: Option<i64>,
    /// Accumulated put-through value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_through_total_value: Option<Decimal>,
    /// Last advertised buy quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_bid: Option<PriceLevel>,
    /// Last advertised sell quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_ask: Option<PriceLevel>,

    // --- Index aggregates -------------------------------------------------
    /// Index value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_value: Option<Decimal>,
    /// Number of advancing constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advances: Option<i64>,
    /// Number of declining constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declines: Option<i64>,
    /// Number of unchanged constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unchanged: Option<i64>,
}

impl MarketState {
    /// Empty state for a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

/// Overwrite `slot` only when the update carries a value.
pub(crate) fn overlay<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}
