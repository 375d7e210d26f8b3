//! Typed Market Events
//!
//! One struct per upstream channel schema. Required fields are plain values,
//! optional fields are `Option`s; [`PartialUpdate::merge_into`] copies exactly
//! the fields an event carries onto a [`MarketState`] and leaves the rest alone.
//!
//! # Wire Format (`MessagePack` map, camelCase keys)
//! ```json
//! {"symbol": "VIC", "matchPrice": 45.1, "matchVolume": 500, "totalVolume": 120000}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{MarketState, overlay};
use super::{Channel, Symbol};

/// A field-wise merge onto an existing market state.
pub trait PartialUpdate {
    /// Write the fields this update carries into `state`.
    fn merge_into(&self, state: &mut MarketState);
}

/// One price level of an order book side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting volume at this price.
    pub volume: i64,
}

/// Side of an advertised quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy interest.
    Buy,
    /// Sell interest.
    Sell,
}

// =============================================================================
// Event Schemas
// =============================================================================

/// Board-lot trade match (`matchPrice`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPrice {
    /// Ticker.
    pub symbol: Symbol,
    /// Matched price.
    pub match_price: Decimal,
    /// Matched volume.
    pub match_volume: i64,
    /// Accumulated volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<i64>,
    /// Accumulated value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Decimal>,
    /// Session open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// Session high.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Session low.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Change against reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Percentage change against reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
    /// Accumulated foreign buy volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_buy_volume: Option<i64>,
    /// Accumulated foreign sell volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_sell_volume: Option<i64>,
    /// Remaining foreign room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_room: Option<i64>,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for MatchPrice {
    fn merge_into(&self, state: &mut MarketState) {
        state.last_price = Some(self.match_price);
        state.last_volume = Some(self.match_volume);
        overlay(&mut state.total_volume, self.total_volume.as_ref());
        overlay(&mut state.total_value, self.total_value.as_ref());
        overlay(&mut state.open, self.open.as_ref());
        overlay(&mut state.high, self.high.as_ref());
        overlay(&mut state.low, self.low.as_ref());
        overlay(&mut state.change, self.change.as_ref());
        overlay(&mut state.change_percent, self.change_percent.as_ref());
        overlay(&mut state.foreign_buy_volume, self.foreign_buy_volume.as_ref());
        overlay(&mut state.foreign_sell_volume, self.foreign_sell_volume.as_ref());
        overlay(&mut state.foreign_room, self.foreign_room.as_ref());
        overlay(&mut state.last_trade_time, self.time.as_ref());
    }
}

/// Best bid/ask levels (`bidAsk` and `bidAskOddLot`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidAsk {
    /// Ticker.
    pub symbol: Symbol,
    /// Bid levels, best first. Absent when the frame only updates asks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bids: Option<Vec<PriceLevel>>,
    /// Ask levels, best first. Absent when the frame only updates bids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asks: Option<Vec<PriceLevel>>,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for BidAsk {
    fn merge_into(&self, state: &mut MarketState) {
        overlay(&mut state.bids, self.bids.as_ref());
        overlay(&mut state.asks, self.asks.as_ref());
    }
}

/// Odd-lot trade match (`matchPriceOddLot`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddLotMatch {
    /// Ticker.
    pub symbol: Symbol,
    /// Matched price.
    pub match_price: Decimal,
    /// Matched volume.
    pub match_volume: i64,
    /// Accumulated odd-lot volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<i64>,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for OddLotMatch {
    fn merge_into(&self, state: &mut MarketState) {
        state.odd_lot_last_price = Some(self.match_price);
        state.odd_lot_last_volume = Some(self.match_volume);
        overlay(&mut state.odd_lot_total_volume, self.total_volume.as_ref());
    }
}

/// Negotiated cross trade (`putThrough`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutThrough {
    /// Ticker.
    pub symbol: Symbol,
    /// Trade price.
    pub price: Decimal,
    /// Trade volume.
    pub volume: i64,
    /// Accumulated put-through volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<i64>,
    /// Accumulated put-through value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Decimal>,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for PutThrough {
    fn merge_into(&self, state: &mut MarketState) {
        state.put_through_price = Some(self.price);
        state.put_through_volume = Some(self.volume);
        overlay(&mut state.put_through_total_volume, self.total_volume.as_ref());
        overlay(&mut state.put_through_total_value, self.total_value.as_ref());
    }
}

/// Advertised negotiation quote (`advertised`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisedQuote {
    /// Ticker.
    pub symbol: Symbol,
    /// Quote side.
    pub side: Side,
    /// Quote price.
    pub price: Decimal,
    /// Quote volume.
    pub volume: i64,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for AdvertisedQuote {
    fn merge_into(&self, state: &mut MarketState) {
        let level = Some(PriceLevel {
            price: self.price,
            volume: self.volume,
        });
        match self.side {
            Side::Buy => state.advertised_bid = level,
            Side::Sell => state.advertised_ask = level,
        }
    }
}

/// Aggregate index update (`index`). `symbol` is the index code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpdate {
    /// Index code (e.g. `VNINDEX`).
    pub symbol: Symbol,
    /// Index value.
    pub value: Decimal,
    /// Change against previous close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Percentage change against previous close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
    /// Accumulated volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<i64>,
    /// Accumulated value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Decimal>,
    /// Advancing constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advances: Option<i64>,
    /// Declining constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declines: Option<i64>,
    /// Unchanged constituents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unchanged: Option<i64>,
    /// Exchange time (`HH:MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PartialUpdate for IndexUpdate {
    fn merge_into(&self, state: &mut MarketState) {
        state.index_value = Some(self.value);
        overlay(&mut state.change, self.change.as_ref());
        overlay(&mut state.change_percent, self.change_percent.as_ref());
        overlay(&mut state.total_volume, self.total_volume.as_ref());
        overlay(&mut state.total_value, self.total_value.as_ref());
        overlay(&mut state.advances, self.advances.as_ref());
        overlay(&mut state.declines, self.declines.as_ref());
        overlay(&mut state.unchanged, self.unchanged.as_ref());
    }
}

// =============================================================================
// Market Event
// =============================================================================

/// A decoded upstream event, tagged by the channel it arrived on.
///
/// Serializes as the bare inner payload; the channel travels next to it in
/// the downstream envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MarketEvent {
    /// `matchPrice`
    MatchPrice(MatchPrice),
    /// `bidAsk`
    BidAsk(BidAsk),
    /// `matchPriceOddLot`
    MatchPriceOddLot(OddLotMatch),
    /// `bidAskOddLot`
    BidAskOddLot(BidAsk),
    /// `putThrough`
    PutThrough(PutThrough),
    /// `advertised`
    Advertised(AdvertisedQuote),
    /// `index`
    Index(IndexUpdate),
}

impl MarketEvent {
    /// Symbol the event applies to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::MatchPrice(e) => &e.symbol,
            Self::BidAsk(e) | Self::BidAskOddLot(e) => &e.symbol,
            Self::MatchPriceOddLot(e) => &e.symbol,
            Self::PutThrough(e) => &e.symbol,
            Self::Advertised(e) => &e.symbol,
            Self::Index(e) => &e.symbol,
        }
    }

    /// Channel the event arrived on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::MatchPrice(_) => Channel::MatchPrice,
            Self::BidAsk(_) => Channel::BidAsk,
            Self::MatchPriceOddLot(_) => Channel::MatchPriceOddLot,
            Self::BidAskOddLot(_) => Channel::BidAskOddLot,
            Self::PutThrough(_) => Channel::PutThrough,
            Self::Advertised(_) => Channel::Advertised,
            Self::Index(_) => Channel::Index,
        }
    }
}

impl PartialUpdate for MarketEvent {
    fn merge_into(&self, state: &mut MarketState) {
        match self {
            Self::MatchPrice(e) => e.merge_into(state),
            Self::BidAsk(e) => e.merge_into(state),
            Self::MatchPriceOddLot(e) => e.merge_into(state),
            // Odd-lot levels land in their own fields, not the board-lot book.
            Self::BidAskOddLot(e) => {
                overlay(&mut state.odd_lot_bids, e.bids.as_ref());
                overlay(&mut state.odd_lot_asks, e.asks.as_ref());
            }
            Self::PutThrough(e) => e.merge_into(state),
            Self::Advertised(e) => e.merge_into(state),
            Self::Index(e) => e.merge_into(state),
        }
    }
}
