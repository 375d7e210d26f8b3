//! Feed Frame Codec
//!
//! `MessagePack` encoding and decoding for the upstream feed.
//!
//! # Wire Format
//!
//! Every frame is a `MessagePack` map with a string `channel` tag and a
//! `payload`. The payload is itself a `MessagePack` map carried either as a
//! `bin` blob or inline.
//!
//! Event frame (upstream → relay):
//! ```json
//! {"channel": "matchPrice", "payload": <bin: {"symbol": "VIC", "matchPrice": "45.1", ...}>}
//! ```
//!
//! Subscribe frame (relay → upstream), one per channel:
//! ```json
//! {"channel": "bidAsk", "action": "subscribe", "payload": <bin: {"symbols": ["VIC", "VHM"]}>}
//! ```
//!
//! Frames that carry an `action` are control acknowledgements and are not
//! decoded as events.

use rmpv::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::market::{
    AdvertisedQuote, BidAsk, Channel, IndexUpdate, MarketEvent, MatchPrice, OddLotMatch,
    PutThrough, Symbol,
};

/// Upstream action that requests a subscription.
pub const SUBSCRIBE_ACTION: &str = "subscribe";

// =============================================================================
// Errors
// =============================================================================

/// A frame that could not be turned into an event. The frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Bytes are not a well-formed frame envelope.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Channel tag is not one the relay knows.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Payload has no usable `symbol` field.
    #[error("{channel} payload is missing symbol")]
    MissingSymbol {
        /// Channel the frame arrived on.
        channel: Channel,
    },

    /// Payload does not match the channel's schema.
    #[error("{channel} payload does not match schema: {reason}")]
    SchemaMismatch {
        /// Channel the frame arrived on.
        channel: Channel,
        /// Deserializer message.
        reason: String,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownChannel(_) => "unknown_channel",
            Self::MissingSymbol { .. } => "missing_symbol",
            Self::SchemaMismatch { .. } => "schema_mismatch",
        }
    }
}

/// Failure to build an outbound frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// `MessagePack` encoding failed.
    #[error("`MessagePack` encode error: {0}")]
    MsgPack(#[from] rmp_serde::encode::Error),

    /// Writing the envelope failed.
    #[error("`MessagePack` write error: {0}")]
    Write(String),
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// A decoded upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Market data event.
    Event(MarketEvent),
    /// Control acknowledgement for an earlier request.
    Ack {
        /// Channel the acknowledgement refers to.
        channel: Channel,
        /// Action being acknowledged.
        action: String,
    },
}

// =============================================================================
// Codec
// =============================================================================

#[derive(Serialize)]
struct SubscribePayload<'a> {
    symbols: &'a [Symbol],
}

/// `MessagePack` codec for upstream feed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one upstream frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing why the frame was rejected.
    pub fn decode(&self, data: &[u8]) -> Result<InboundFrame, DecodeError> {
        let envelope = read_value(data)?;
        let Value::Map(fields) = envelope else {
            return Err(DecodeError::Malformed("frame is not a map".to_string()));
        };

        let name = lookup(&fields, "channel")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::Malformed("missing channel tag".to_string()))?;
        let channel =
            Channel::parse(name).ok_or_else(|| DecodeError::UnknownChannel(name.to_string()))?;

        if let Some(action) = lookup(&fields, "action").and_then(Value::as_str) {
            return Ok(InboundFrame::Ack {
                channel,
                action: action.to_string(),
            });
        }

        let payload = match lookup(&fields, "payload") {
            Some(Value::Binary(bytes)) => read_value(bytes)?,
            Some(inline @ Value::Map(_)) => inline.clone(),
            Some(_) => {
                return Err(DecodeError::Malformed(
                    "payload is neither bin nor map".to_string(),
                ));
            }
            None => return Err(DecodeError::Malformed("missing payload".to_string())),
        };

        Self::decode_payload(channel, payload).map(InboundFrame::Event)
    }

    /// Decode a payload already separated from its envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingSymbol`] if the payload has no
    /// non-empty string `symbol`, or [`DecodeError::SchemaMismatch`] if it
    /// does not fit the channel's schema.
    pub fn decode_payload(channel: Channel, payload: Value) -> Result<MarketEvent, DecodeError> {
        let has_symbol = payload.as_map().is_some_and(|fields| {
            lookup(fields, "symbol")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty())
        });
        if !has_symbol {
            return Err(DecodeError::MissingSymbol { channel });
        }

        Ok(match channel {
            Channel::MatchPrice => MarketEvent::MatchPrice(from_payload::<MatchPrice>(channel, payload)?),
            Channel::BidAsk => MarketEvent::BidAsk(from_payload::<BidAsk>(channel, payload)?),
            Channel::MatchPriceOddLot => {
                MarketEvent::MatchPriceOddLot(from_payload::<OddLotMatch>(channel, payload)?)
            }
            Channel::BidAskOddLot => MarketEvent::BidAskOddLot(from_payload::<BidAsk>(channel, payload)?),
            Channel::PutThrough => MarketEvent::PutThrough(from_payload::<PutThrough>(channel, payload)?),
            Channel::Advertised => {
                MarketEvent::Advertised(from_payload::<AdvertisedQuote>(channel, payload)?)
            }
            Channel::Index => MarketEvent::Index(from_payload::<IndexUpdate>(channel, payload)?),
        })
    }

    /// Build the subscribe frame for one channel.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_subscribe(
        &self,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<Vec<u8>, EncodeError> {
        let payload = rmp_serde::to_vec_named(&SubscribePayload { symbols })?;
        Self::encode_envelope(channel, Some(SUBSCRIBE_ACTION), payload)
    }

    /// Build an event frame from any serializable payload.
    ///
    /// Used by tooling and tests that stand in for the upstream feed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_event<T: Serialize>(
        &self,
        channel: Channel,
        payload: &T,
    ) -> Result<Vec<u8>, EncodeError> {
        let payload = rmp_serde::to_vec_named(payload)?;
        Self::encode_envelope(channel, None, payload)
    }

    fn encode_envelope(
        channel: Channel,
        action: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut fields = vec![(Value::from("channel"), Value::from(channel.as_str()))];
        if let Some(action) = action {
            fields.push((Value::from("action"), Value::from(action)));
        }
        fields.push((Value::from("payload"), Value::Binary(payload)));

        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &Value::Map(fields))
            .map_err(|e| EncodeError::Write(e.to_string()))?;
        Ok(out)
    }
}

fn read_value(mut data: &[u8]) -> Result<Value, DecodeError> {
    rmpv::decode::read_value(&mut data).map_err(|e| DecodeError::Malformed(e.to_string()))
}

fn lookup<'a>(fields: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    fields
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn from_payload<T: DeserializeOwned>(channel: Channel, payload: Value) -> Result<T, DecodeError> {
    rmpv::ext::from_value(payload).map_err(|e| DecodeError::SchemaMismatch {
        channel,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;
    use crate::domain::market::{PriceLevel, Side};

    fn vic_match() -> MatchPrice {
        MatchPrice {
            symbol: "VIC".to_string(),
            match_price: Decimal::new(451, 1),
            match_volume: 1_000,
            total_volume: Some(250_000),
            total_value: None,
            open: None,
            high: None,
            low: None,
            change: None,
            change_percent: None,
            foreign_buy_volume: None,
            foreign_sell_volume: None,
            foreign_room: None,
            time: Some("09:15:00".to_string()),
        }
    }

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
    }

    fn frame(channel: &str, payload: &Value) -> Vec<u8> {
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, payload).unwrap();
        let envelope = map(vec![
            ("channel", Value::from(channel)),
            ("payload", Value::Binary(bytes)),
        ]);
        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &envelope).unwrap();
        out
    }

    #[test]
    fn decode_match_price_event() {
        let codec = FrameCodec::new();
        let bytes = codec.encode_event(Channel::MatchPrice, &vic_match()).unwrap();

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, InboundFrame::Event(MarketEvent::MatchPrice(vic_match())));
    }

    #[test]
    fn decode_odd_lot_book_uses_odd_lot_variant() {
        let codec = FrameCodec::new();
        let book = BidAsk {
            symbol: "FPT".to_string(),
            bids: Some(vec![PriceLevel { price: Decimal::from(120), volume: 50 }]),
            asks: None,
            time: None,
        };
        let bytes = codec.encode_event(Channel::BidAskOddLot, &book).unwrap();

        match codec.decode(&bytes).unwrap() {
            InboundFrame::Event(MarketEvent::BidAskOddLot(decoded)) => assert_eq!(decoded, book),
            other => panic!("expected odd-lot book, got {other:?}"),
        }
    }

    #[test]
    fn decode_accepts_inline_payload_map() {
        let payload = map(vec![
            ("symbol", Value::from("SSI")),
            ("side", Value::from("buy")),
            ("price", Value::from("31.5")),
            ("volume", Value::from(2_000)),
        ]);
        let envelope = map(vec![("channel", Value::from("advertised")), ("payload", payload)]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &envelope).unwrap();

        match FrameCodec::new().decode(&bytes).unwrap() {
            InboundFrame::Event(MarketEvent::Advertised(quote)) => {
                assert_eq!(quote.side, Side::Buy);
                assert_eq!(quote.price, Decimal::new(315, 1));
            }
            other => panic!("expected advertised quote, got {other:?}"),
        }
    }

    #[test]
    fn missing_symbol_is_rejected() {
        let payload = map(vec![("value", Value::from("1250.5"))]);
        let err = FrameCodec::new().decode(&frame("index", &payload)).unwrap_err();
        assert_eq!(err, DecodeError::MissingSymbol { channel: Channel::Index });
        assert_eq!(err.reason(), "missing_symbol");
    }

    #[test_case(Channel::MatchPrice ; "match price")]
    #[test_case(Channel::BidAsk ; "bid ask")]
    #[test_case(Channel::MatchPriceOddLot ; "odd lot match price")]
    #[test_case(Channel::BidAskOddLot ; "odd lot bid ask")]
    #[test_case(Channel::PutThrough ; "put through")]
    #[test_case(Channel::Advertised ; "advertised")]
    #[test_case(Channel::Index ; "index")]
    fn every_channel_requires_a_symbol(channel: Channel) {
        let payload = map(vec![("time", Value::from("09:15:00"))]);
        let err = FrameCodec::new()
            .decode(&frame(channel.as_str(), &payload))
            .unwrap_err();
        assert_eq!(err, DecodeError::MissingSymbol { channel });
    }

    #[test]
    fn empty_symbol_is_rejected() {
        let payload = map(vec![("symbol", Value::from("")), ("value", Value::from("1"))]);
        let err = FrameCodec::new().decode(&frame("index", &payload)).unwrap_err();
        assert!(matches!(err, DecodeError::MissingSymbol { .. }));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        // matchVolume must be an integer
        let payload = map(vec![
            ("symbol", Value::from("VIC")),
            ("matchPrice", Value::from("45.1")),
            ("matchVolume", Value::from("lots")),
        ]);
        let err = FrameCodec::new().decode(&frame("matchPrice", &payload)).unwrap_err();
        assert!(matches!(err, DecodeError::SchemaMismatch { channel: Channel::MatchPrice, .. }));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let payload = map(vec![("symbol", Value::from("VIC"))]);
        let err = FrameCodec::new().decode(&frame("quotes", &payload)).unwrap_err();
        assert_eq!(err, DecodeError::UnknownChannel("quotes".to_string()));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = FrameCodec::new().decode(&[0xc1, 0x00]).unwrap_err();
        assert_eq!(err.reason(), "malformed");

        let mut not_a_map = Vec::new();
        rmpv::encode::write_value(&mut not_a_map, &Value::from(42)).unwrap();
        assert!(matches!(
            FrameCodec::new().decode(&not_a_map),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn subscribe_frame_layout() {
        let codec = FrameCodec::new();
        let symbols = vec!["VIC".to_string(), "VHM".to_string()];
        let bytes = codec.encode_subscribe(Channel::BidAsk, &symbols).unwrap();

        let envelope = rmpv::decode::read_value(&mut bytes.as_slice()).unwrap();
        let fields = envelope.as_map().unwrap();
        assert_eq!(lookup(fields, "channel").and_then(Value::as_str), Some("bidAsk"));
        assert_eq!(lookup(fields, "action").and_then(Value::as_str), Some("subscribe"));

        let Some(Value::Binary(payload)) = lookup(fields, "payload") else {
            panic!("payload should be bin");
        };
        let payload = rmpv::decode::read_value(&mut payload.as_slice()).unwrap();
        let listed: Vec<_> = lookup(payload.as_map().unwrap(), "symbols")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(listed, ["VIC", "VHM"]);
    }

    #[test]
    fn subscribe_ack_is_not_an_event() {
        let codec = FrameCodec::new();
        let bytes = codec.encode_subscribe(Channel::Index, &[]).unwrap();
        assert_eq!(
            codec.decode(&bytes).unwrap(),
            InboundFrame::Ack {
                channel: Channel::Index,
                action: "subscribe".to_string()
            }
        );
    }
}
