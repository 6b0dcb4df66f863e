use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    schema::{NormalizedMessage, Side, Ticker, Trade},
    util::{self, Number, Timestamp},
};

use super::connector::{ExchangeConnector, Heartbeat};

pub const OKX_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// OKX WebSocket connector
///
/// OKX Spot WS v5:
/// https://www.okx.com/docs-v5/en/#websocket-api-public-channel-trades
///
/// Channels:
/// - trades   → trades (one frame may carry several fills)
/// - tickers  → ticker
///
/// OKX drops idle connections after 30s, so a text `ping` is sent
/// every 25s; the `pong` reply is not JSON and normalizes to nothing.
pub struct OkxConnector {
    inst_ids: Vec<String>,
    url: String,
}

impl OkxConnector {
    pub fn new(inst_ids: Vec<String>) -> Self {
        Self {
            inst_ids,
            url: OKX_WS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct OkxPush {
    arg: OkxArg,
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OkxArg {
    channel: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxTrade {
    inst_id: String,
    px: Number,
    sz: Number,
    side: String,
    ts: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxTicker {
    inst_id: String,
    last: Option<Number>,
    bid_px: Option<Number>,
    ask_px: Option<Number>,
    vol24h: Option<Number>,
    ts: Option<Timestamp>,
}

fn timestamp_or_now(ts: Option<&Timestamp>) -> i64 {
    ts.and_then(Timestamp::to_i64).unwrap_or_else(util::now_ms)
}

impl OkxTrade {
    fn normalize(self, exchange: &str) -> Option<NormalizedMessage> {
        // OKX reports the taker side directly
        let side = match self.side.as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => return None,
        };

        Some(NormalizedMessage::Trade(Trade {
            exchange: exchange.to_string(),
            price: self.px.to_non_negative()?,
            amount: self.sz.to_non_negative()?,
            timestamp: timestamp_or_now(self.ts.as_ref()),
            side,
            symbol: self.inst_id,
        }))
    }
}

impl OkxTicker {
    fn normalize(self, exchange: &str) -> NormalizedMessage {
        NormalizedMessage::Ticker(Ticker {
            exchange: exchange.to_string(),
            bid: util::or_zero(self.bid_px.as_ref()),
            ask: util::or_zero(self.ask_px.as_ref()),
            last: util::or_zero(self.last.as_ref()),
            // spot tickers have no mark price
            mark_price: 0.0,
            volume_24h: util::or_zero(self.vol24h.as_ref()).max(0.0),
            timestamp: timestamp_or_now(self.ts.as_ref()),
            symbol: self.inst_id,
        })
    }
}

impl ExchangeConnector for OkxConnector {
    fn name(&self) -> &str {
        "okx"
    }

    fn endpoint(&self) -> &str {
        &self.url
    }

    fn subscription_request(&self) -> Value {
        let args: Vec<Value> = self
            .inst_ids
            .iter()
            .flat_map(|inst_id| {
                ["trades", "tickers"].map(|channel| {
                    json!({
                        "channel": channel,
                        "instId": inst_id
                    })
                })
            })
            .collect();

        json!({
            "op": "subscribe",
            "args": args
        })
    }

    fn normalize_message(&self, raw: &str) -> Vec<NormalizedMessage> {
        // --------------------------------------------------
        // Control frames
        // --------------------------------------------------
        // "pong", {"event":"subscribe",...}, {"event":"error",...}
        // all fail to parse as a data push.
        let push: OkxPush = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(_) => {
                if raw.contains(r#""event":"error""#) {
                    log::warn!("[okx] error event: {}", raw);
                }
                return Vec::new();
            }
        };

        let exchange = self.name();

        match push.arg.channel.as_str() {
            "trades" => push
                .data
                .into_iter()
                .filter_map(|v| serde_json::from_value::<OkxTrade>(v).ok())
                .filter_map(|t| t.normalize(exchange))
                .collect(),

            "tickers" => push
                .data
                .into_iter()
                .filter_map(|v| serde_json::from_value::<OkxTicker>(v).ok())
                .map(|t| t.normalize(exchange))
                .collect(),

            _ => Vec::new(),
        }
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        Some(Heartbeat {
            interval: Duration::from_secs(25),
            payload: "ping",
        })
    }
}
