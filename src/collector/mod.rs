/// Collector module
///
/// Shared runtime for exchange connectors:
/// - One long-lived task per connector
/// - Connect, subscribe, stream, retry
/// - Hands normalized messages to the broker
///
/// Design notes:
/// - Exchange-specific logic MUST NOT live here
/// - Faults stay inside the connector's own loop
pub mod runner;

pub use runner::{Connector, ConnectorSettings, ConnectorState};
