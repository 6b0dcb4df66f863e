use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    schema::{NormalizedMessage, Ohlcv, Side, Ticker, Trade},
    util::{self, Number, Timestamp},
};

use super::connector::ExchangeConnector;

pub const DELTA_WS_URL: &str = "wss://socket.india.delta.exchange";

/// Public channels subscribed for every symbol.
const CHANNELS: [&str; 3] = ["all_trades", "candlestick_1m", "v2/ticker"];

/// Delta Exchange WebSocket connector
///
/// Channels:
/// - all_trades      → trades
/// - candlestick_1m  → ohlcv
/// - v2/ticker       → ticker
///
/// DESIGN:
/// - Pure protocol translation
/// - No reconnect logic
/// - No state beyond configuration
pub struct DeltaConnector {
    symbols: Vec<String>,
    url: String,
}

impl DeltaConnector {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            url: DELTA_WS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for DeltaConnector {
    fn default() -> Self {
        Self::new(vec!["BTCUSD".into(), "ETHUSD".into()])
    }
}

// --------------------------------------------------
// Vendor frames
// --------------------------------------------------
//
// Parsed at the boundary; anything that does not match one of
// these shapes is dropped as unrecognized.
//
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeltaFrame {
    #[serde(rename = "all_trades")]
    Trade(DeltaTrade),

    #[serde(rename = "candlestick_1m")]
    Candle(DeltaCandle),

    #[serde(rename = "v2/ticker")]
    Ticker(DeltaTicker),

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaTrade {
    symbol: String,
    price: Number,
    size: Number,
    timestamp: Option<Timestamp>,
    buyer_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaCandle {
    symbol: String,
    open: Number,
    high: Number,
    low: Number,
    close: Number,
    volume: Number,
    timestamp: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct DeltaTicker {
    symbol: String,
    best_bid: Option<Number>,
    best_ask: Option<Number>,
    last_price: Option<Number>,
    mark_price: Option<Number>,
    volume_24h: Option<Number>,
    timestamp: Option<Timestamp>,
}

fn timestamp_or_now(ts: Option<&Timestamp>) -> i64 {
    ts.and_then(Timestamp::to_i64).unwrap_or_else(util::now_us)
}

// --------------------------------------------------
// TRADES
// --------------------------------------------------
// A maker buyer means the aggressor sold.
impl DeltaTrade {
    fn normalize(self, exchange: &str) -> Option<NormalizedMessage> {
        Some(NormalizedMessage::Trade(Trade {
            exchange: exchange.to_string(),
            price: self.price.to_non_negative()?,
            amount: self.size.to_non_negative()?,
            timestamp: timestamp_or_now(self.timestamp.as_ref()),
            side: match self.buyer_role.as_deref() {
                Some("maker") => Side::Sell,
                _ => Side::Buy,
            },
            symbol: self.symbol,
        }))
    }
}

// --------------------------------------------------
// OHLCV
// --------------------------------------------------
impl DeltaCandle {
    fn normalize(self, exchange: &str) -> Option<NormalizedMessage> {
        Some(NormalizedMessage::Ohlcv(Ohlcv {
            exchange: exchange.to_string(),
            open: self.open.to_f64()?,
            high: self.high.to_f64()?,
            low: self.low.to_f64()?,
            close: self.close.to_f64()?,
            volume: self.volume.to_non_negative()?,
            timestamp: timestamp_or_now(self.timestamp.as_ref()),
            symbol: self.symbol,
        }))
    }
}

// --------------------------------------------------
// TICKER
// --------------------------------------------------
// Every numeric field is optional and defaults to 0.
impl DeltaTicker {
    fn normalize(self, exchange: &str) -> NormalizedMessage {
        NormalizedMessage::Ticker(Ticker {
            exchange: exchange.to_string(),
            bid: util::or_zero(self.best_bid.as_ref()),
            ask: util::or_zero(self.best_ask.as_ref()),
            last: util::or_zero(self.last_price.as_ref()),
            mark_price: util::or_zero(self.mark_price.as_ref()),
            volume_24h: util::or_zero(self.volume_24h.as_ref()).max(0.0),
            timestamp: timestamp_or_now(self.timestamp.as_ref()),
            symbol: self.symbol,
        })
    }
}

impl ExchangeConnector for DeltaConnector {
    fn name(&self) -> &str {
        "delta"
    }

    fn endpoint(&self) -> &str {
        &self.url
    }

    fn subscription_request(&self) -> Value {
        let channels: Vec<Value> = CHANNELS
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "symbols": self.symbols,
                })
            })
            .collect();

        json!({
            "type": "subscribe",
            "payload": { "channels": channels }
        })
    }

    fn normalize_message(&self, raw: &str) -> Vec<NormalizedMessage> {
        let frame: DeltaFrame = match serde_json::from_str(raw) {
            Ok(f) => f,
            Err(e) => {
                log::trace!("[delta] unparsed frame ({}): {}", e, raw);
                return Vec::new();
            }
        };

        let exchange = self.name();

        let msg = match frame {
            DeltaFrame::Trade(t) => t.normalize(exchange),
            DeltaFrame::Candle(c) => c.normalize(exchange),
            DeltaFrame::Ticker(t) => Some(t.normalize(exchange)),

            // subscriptions ack, heartbeat, other channels
            DeltaFrame::Other => None,
        };

        msg.into_iter().collect()
    }
}
