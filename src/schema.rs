use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Central message enum used across the entire streaming pipeline.
///
/// Every exchange connector maps its vendor frames onto one of these
/// variants. The broker never sees the enum itself, only the topic and the
/// serialized payload.
///
/// WIRE SHAPE:
/// - Serialized untagged: the payload is the flat record of the variant.
/// - The message kind travels in the topic (`"{kind}.{exchange}"`), so the
///   payload carries no `type` field.
///
/// Consumers that want the typed value back use [`NormalizedMessage::decode`]
/// with the kind taken from the topic.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum NormalizedMessage {
    Trade(Trade),
    Ohlcv(Ohlcv),
    Ticker(Ticker),
}

impl NormalizedMessage {
    /// Topic kind this message is published under.
    pub fn kind(&self) -> TopicKind {
        match self {
            NormalizedMessage::Trade(_) => TopicKind::Trades,
            NormalizedMessage::Ohlcv(_) => TopicKind::Ohlcv,
            NormalizedMessage::Ticker(_) => TopicKind::Ticker,
        }
    }

    pub fn exchange(&self) -> &str {
        match self {
            NormalizedMessage::Trade(t) => &t.exchange,
            NormalizedMessage::Ohlcv(c) => &c.exchange,
            NormalizedMessage::Ticker(t) => &t.exchange,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            NormalizedMessage::Trade(t) => &t.symbol,
            NormalizedMessage::Ohlcv(c) => &c.symbol,
            NormalizedMessage::Ticker(t) => &t.symbol,
        }
    }

    /// Serializes the payload half of a published unit.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a payload received under a topic of the given kind.
    ///
    /// The kind disambiguates the flat record, so a ticker payload is never
    /// mistaken for a trade even if a vendor adds overlapping fields.
    pub fn decode(kind: TopicKind, payload: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            TopicKind::Trades => NormalizedMessage::Trade(serde_json::from_str(payload)?),
            TopicKind::Ohlcv => NormalizedMessage::Ohlcv(serde_json::from_str(payload)?),
            TopicKind::Ticker => NormalizedMessage::Ticker(serde_json::from_str(payload)?),
        })
    }
}

// ------------------------------------------------------------
// Trade message
// ------------------------------------------------------------
//
// A single executed trade. `side` is the aggressor side.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trade {
    /// Exchange identifier (e.g. "delta", "okx")
    pub exchange: String,

    /// Vendor symbol, passed through unchanged (e.g. "BTCUSD", "BTC-USDT")
    pub symbol: String,

    /// Execution price, always >= 0
    pub price: f64,

    /// Executed quantity, always >= 0
    pub amount: f64,

    /// Vendor timestamp (unit is exchange specific)
    pub timestamp: i64,

    pub side: Side,
}

// ------------------------------------------------------------
// OHLCV message
// ------------------------------------------------------------
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ohlcv {
    pub exchange: String,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Traded volume over the candle, always >= 0
    pub volume: f64,

    pub timestamp: i64,
}

// ------------------------------------------------------------
// Ticker message
// ------------------------------------------------------------
//
// Fields a vendor does not provide are published as 0 rather than
// omitted, so consumers can rely on a fixed shape.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ticker {
    pub exchange: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub mark_price: f64,
    pub volume_24h: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Message kinds addressable on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Trades,
    Ohlcv,
    Ticker,
}

impl TopicKind {
    pub const ALL: [TopicKind; 3] = [TopicKind::Trades, TopicKind::Ohlcv, TopicKind::Ticker];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Trades => "trades",
            TopicKind::Ohlcv => "ohlcv",
            TopicKind::Ticker => "ticker",
        }
    }
}

impl FromStr for TopicKind {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TopicError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed topic `{0}`")]
pub struct TopicError(pub String);

/// Broker topic: `"{kind}.{exchange}"`.
///
/// Only constructible from a known kind and a non-empty exchange name
/// without dots, so every published topic is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    kind: TopicKind,
    exchange: String,
}

impl Topic {
    pub fn new(kind: TopicKind, exchange: &str) -> Result<Self, TopicError> {
        if exchange.is_empty() || exchange.contains('.') || exchange.contains(char::is_whitespace) {
            return Err(TopicError(format!("{}.{}", kind.as_str(), exchange)));
        }
        Ok(Self {
            kind,
            exchange: exchange.to_string(),
        })
    }

    pub fn kind(&self) -> TopicKind {
        self.kind
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.as_str(), self.exchange)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, exchange) = s.split_once('.').ok_or_else(|| TopicError(s.to_string()))?;
        let kind = kind.parse::<TopicKind>().map_err(|_| TopicError(s.to_string()))?;
        Topic::new(kind, exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(exchange: &str) -> NormalizedMessage {
        NormalizedMessage::Trade(Trade {
            exchange: exchange.into(),
            symbol: "BTCUSD".into(),
            price: 50000.5,
            amount: 0.01,
            timestamp: 123,
            side: Side::Sell,
        })
    }

    #[test]
    fn same_kind_on_different_exchanges_gives_distinct_topics() {
        let delta = Topic::new(trade("delta").kind(), "delta").unwrap();
        let okx = Topic::new(trade("okx").kind(), "okx").unwrap();

        assert_eq!(delta.to_string(), "trades.delta");
        assert_eq!(okx.to_string(), "trades.okx");
        assert_ne!(delta, okx);
    }

    #[test]
    fn topic_rejects_malformed_exchange_names() {
        assert!(Topic::new(TopicKind::Ticker, "").is_err());
        assert!(Topic::new(TopicKind::Ticker, "a.b").is_err());
        assert!(Topic::new(TopicKind::Ticker, "de lta").is_err());
    }

    #[test]
    fn topic_parses_its_own_display() {
        let topic: Topic = "ohlcv.delta".parse().unwrap();
        assert_eq!(topic.kind(), TopicKind::Ohlcv);
        assert_eq!(topic.exchange(), "delta");

        assert!("candles.delta".parse::<Topic>().is_err());
        assert!("trades".parse::<Topic>().is_err());
    }

    #[test]
    fn payload_is_flat_and_side_is_lowercase() {
        let payload = trade("delta").to_payload().unwrap();
        let v: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(v["side"], "sell");
        assert_eq!(v["price"], 50000.5);
        assert!(v.get("type").is_none());
        assert!(v.get("Trade").is_none());
    }

    #[test]
    fn decode_uses_topic_kind() {
        let msg = trade("delta");
        let payload = msg.to_payload().unwrap();

        assert_eq!(NormalizedMessage::decode(TopicKind::Trades, &payload).unwrap(), msg);
        assert!(NormalizedMessage::decode(TopicKind::Ohlcv, &payload).is_err());
    }
}
