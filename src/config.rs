use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::wire;
use crate::error::{Result, StreamerError};
use crate::exchanges;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Where the broker binds
// - Shared connector runtime parameters
// - Enabled exchanges and their symbols
// - Optional debug configuration
//
// Everything is fixed at construction; there is no runtime
// reconfiguration.
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    pub exchanges: Vec<ExchangeConfig>,

    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Broker configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    /// ZeroMQ address: `tcp://host:port` or `ipc:///path/to/socket`
    pub bind: String,

    /// Units buffered between publishers and the broker writer task.
    /// Publishes beyond this are dropped, never awaited.
    pub queue_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: "ipc:///tmp/data_streamer.ipc".into(),
            queue_capacity: 10_000,
        }
    }
}

// ------------------------------------------------------------
// Connector runtime configuration
// ------------------------------------------------------------
//
// Shared by all connectors unless overridden per exchange.
//
// NOTE:
// The reconnect delay is fixed. `reconnect_jitter_ms` exists for
// deployments running many connectors against the same venue and
// is 0 by default.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub reconnect_delay_ms: u64,
    pub reconnect_jitter_ms: u64,
    pub connect_timeout_ms: u64,

    /// Upper bound for joining connector tasks on stop
    pub shutdown_timeout_ms: u64,

    /// 0 disables the periodic metrics line
    pub metrics_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            reconnect_jitter_ms: 0,
            connect_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            metrics_interval_secs: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn metrics_interval(&self) -> Option<Duration> {
        (self.metrics_interval_secs > 0).then(|| Duration::from_secs(self.metrics_interval_secs))
    }
}

// ------------------------------------------------------------
// Exchange configuration
// ------------------------------------------------------------
//
// One entry per connector. Each connector runs independently
// with its own connection and retry loop.
//
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Exchange identifier (e.g. "delta", "okx")
    pub name: String,

    /// Enables or disables this exchange at startup
    pub enabled: bool,

    /// Vendor symbols to subscribe to (e.g. "BTCUSD" on Delta,
    /// "BTC-USDT" on OKX)
    pub symbols: Vec<String>,

    /// Overrides the connector's default WebSocket endpoint
    pub url: Option<String>,

    /// Overrides `runtime.reconnect_delay_ms` for this exchange
    pub reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Raises the default log level to `debug`
    pub log: Option<bool>,
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            StreamerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let cfg: Config =
            serde_json::from_str(data).map_err(|e| StreamerError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().and_then(|d| d.log).unwrap_or(false)
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        wire::parse_endpoint(&self.broker.bind)?;

        if self.broker.queue_capacity == 0 {
            return Err(StreamerError::Config("broker.queue_capacity must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for ex in &self.exchanges {
            if !seen.insert(ex.name.as_str()) {
                return Err(StreamerError::Config(format!("exchange '{}' listed twice", ex.name)));
            }
            if !ex.enabled {
                continue;
            }
            if !exchanges::SUPPORTED.contains(&ex.name.as_str()) {
                return Err(StreamerError::Config(format!(
                    "exchange '{}' is not supported",
                    ex.name
                )));
            }
            if ex.symbols.is_empty() {
                return Err(StreamerError::Config(format!(
                    "exchange '{}' has no symbols",
                    ex.name
                )));
            }
        }

        if self.enabled_exchanges().next().is_none() {
            return Err(StreamerError::Config("no exchange enabled".into()));
        }

        Ok(())
    }
}
