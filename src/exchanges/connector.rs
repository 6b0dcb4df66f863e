use std::time::Duration;

use serde_json::Value;

use crate::schema::NormalizedMessage;

/// Application-level keepalive some venues require while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,

    /// Sent verbatim as a text frame
    pub payload: &'static str,
}

/// ExchangeConnector is the capability set separating:
/// - The shared connector runtime (connect, subscribe, retry, publish)
/// - Exchange-specific WebSocket protocols
///
/// Each exchange implementation must:
/// - Say where to connect
/// - Build its subscription request
/// - Normalize raw frames into `NormalizedMessage`s
///
/// DESIGN GOALS:
/// - Zero exchange-specific logic in the runtime
/// - Adding an exchange means implementing this trait only
///
/// THREAD SAFETY:
/// - Must be Send + Sync; one instance is shared with its runner task
///
pub trait ExchangeConnector: Send + Sync {
    /// Canonical exchange name, used as the topic suffix.
    ///
    /// CONTRACT:
    /// - Lowercase, no dots, stable (e.g. "delta", "okx")
    /// - Matches `exchanges[].name` in configuration
    fn name(&self) -> &str;

    /// Full WebSocket URL (ws:// or wss://).
    fn endpoint(&self) -> &str;

    /// Subscription payload, sent once immediately after every connect.
    ///
    /// MUST NOT:
    /// - Perform network I/O
    /// - Mutate shared state
    fn subscription_request(&self) -> Value;

    /// Maps one raw text frame onto zero, one or many normalized messages.
    ///
    /// OUTPUT:
    /// - Empty for heartbeats, acknowledgements, errors, unknown shapes
    ///   and frames that fail validation
    ///
    /// IMPORTANT:
    /// - Pure: no side effects beyond parsing
    /// - Must never panic on vendor input
    /// - Numbers are coerced to `f64` here; prices, amounts and volumes
    ///   are never negative in the output
    fn normalize_message(&self, raw: &str) -> Vec<NormalizedMessage>;

    /// Optional keepalive sent by the runtime while streaming.
    fn heartbeat(&self) -> Option<Heartbeat> {
        None
    }
}
