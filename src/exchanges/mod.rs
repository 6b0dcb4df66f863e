//! Exchange connector registry and factory
//!
//! This module provides:
//! - Central registration of all supported exchanges
//! - A factory function building a connector from its config entry
//!
//! All exchange-specific logic lives in the connector modules. The
//! rest of the crate talks to exchanges exclusively through the
//! `ExchangeConnector` trait.

pub mod connector;
pub mod delta;
pub mod okx;

use std::sync::Arc;

use crate::config::ExchangeConfig;
use connector::ExchangeConnector;

/// Names accepted in `exchanges[].name`.
pub const SUPPORTED: [&str; 2] = ["delta", "okx"];

/// Builds the connector for one configuration entry.
///
/// RETURNS:
/// - `Some(Arc<dyn ExchangeConnector>)` if the exchange is supported
/// - `None` if the name is unknown
///
/// The configured `url`, if any, replaces the connector's default
/// endpoint.
pub fn build_connector(cfg: &ExchangeConfig) -> Option<Arc<dyn ExchangeConnector>> {
    let symbols = cfg.symbols.clone();

    match cfg.name.as_str() {
        "delta" => {
            let c = delta::DeltaConnector::new(symbols);
            Some(Arc::new(match &cfg.url {
                Some(url) => c.with_endpoint(url.as_str()),
                None => c,
            }))
        }
        "okx" => {
            let c = okx::OkxConnector::new(symbols);
            Some(Arc::new(match &cfg.url {
                Some(url) => c.with_endpoint(url.as_str()),
                None => c,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, url: Option<&str>) -> ExchangeConfig {
        ExchangeConfig {
            name: name.into(),
            enabled: true,
            symbols: vec!["BTCUSD".into()],
            url: url.map(Into::into),
            reconnect_delay_ms: None,
        }
    }

    #[test]
    fn every_supported_name_builds() {
        for name in SUPPORTED {
            let c = build_connector(&entry(name, None)).unwrap();
            assert_eq!(c.name(), name);
        }
        assert!(build_connector(&entry("kraken", None)).is_none());
    }

    #[test]
    fn configured_url_overrides_default() {
        let c = build_connector(&entry("delta", Some("ws://127.0.0.1:1"))).unwrap();
        assert_eq!(c.endpoint(), "ws://127.0.0.1:1");

        let c = build_connector(&entry("okx", None)).unwrap();
        assert_eq!(c.endpoint(), okx::OKX_WS_URL);
    }
}
