//! Market Data Types
//!
//! Identifiers shared by every layer of the relay:
//!
//! - [`Symbol`]: ticker or index code, opaque to the relay
//! - [`Group`]: fixed exchange segment / basket that owns an ordered symbol list
//! - [`Channel`]: upstream channel taxonomy, reused for downstream delivery
//!
//! Event payloads live in [`events`], the merged per-symbol record in [`state`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod events;
pub mod state;

pub use events::{
    AdvertisedQuote, BidAsk, IndexUpdate, MarketEvent, MatchPrice, OddLotMatch, PartialUpdate,
    PriceLevel, PutThrough, Side,
};
pub use state::MarketState;

/// A ticker or index code (e.g. `VIC`, `VNINDEX`).
pub type Symbol = String;

// =============================================================================
// Group
// =============================================================================

/// Exchange segment or basket that the bulk refresh loads as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Group {
    /// Ho Chi Minh City Stock Exchange.
    Hose,
    /// Hanoi Stock Exchange.
    Hnx,
    /// Unlisted Public Company Market.
    Upcom,
    /// VN30 basket.
    Vn30,
    /// HNX30 basket.
    Hnx30,
}

impl Group {
    /// All groups in refresh order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Hose, Self::Hnx, Self::Upcom, Self::Vn30, Self::Hnx30]
    }

    /// Upstream name of the group.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hose => "HOSE",
            Self::Hnx => "HNX",
            Self::Upcom => "UPCOM",
            Self::Vn30 => "VN30",
            Self::Hnx30 => "HNX30",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a group name is not one of the fixed [`Group`] values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown group: {0}")]
pub struct UnknownGroup(pub String);

impl FromStr for Group {
    type Err = UnknownGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownGroup(s.to_string()))
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Upstream channel names. Downstream delivery reuses the same names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    /// Board-lot trade matches.
    MatchPrice,
    /// Board-lot best bid/ask levels.
    BidAsk,
    /// Odd-lot trade matches.
    MatchPriceOddLot,
    /// Odd-lot best bid/ask levels.
    BidAskOddLot,
    /// Negotiated (cross) trades.
    PutThrough,
    /// Advertised negotiation quotes.
    Advertised,
    /// Aggregate index updates.
    Index,
}

impl Channel {
    /// Every upstream channel, in subscription order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::MatchPrice,
            Self::BidAsk,
            Self::MatchPriceOddLot,
            Self::BidAskOddLot,
            Self::PutThrough,
            Self::Advertised,
            Self::Index,
        ]
    }

    /// Wire name of the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MatchPrice => "matchPrice",
            Self::BidAsk => "bidAsk",
            Self::MatchPriceOddLot => "matchPriceOddLot",
            Self::BidAskOddLot => "bidAskOddLot",
            Self::PutThrough => "putThrough",
            Self::Advertised => "advertised",
            Self::Index => "index",
        }
    }

    /// Parse a wire channel name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
