// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// - schema:    Normalized message shapes and broker topics
// - util:      Numeric coercion and clock helpers
// - error:     Caller-visible error taxonomy
// - config:    Configuration structs loaded from JSON
// - metrics:   Lock-free runtime counters
// - exchanges: Connector trait, exchange connectors and registry
// - collector: Shared connector runtime (connect / retry / publish)
// - broker:    Topic-addressed fan-out and its wire protocol
// - manager:   Process-wide lifecycle orchestration
//
pub mod broker;
pub mod collector;
pub mod config;
pub mod error;
pub mod exchanges;
pub mod manager;
pub mod metrics;
pub mod schema;
pub mod util;

pub use broker::{PubSubBroker, PublishOutcome, wire::Subscriber};
pub use collector::{Connector, ConnectorSettings, ConnectorState};
pub use config::Config;
pub use error::StreamerError;
pub use exchanges::connector::ExchangeConnector;
pub use manager::StreamManager;
pub use schema::{NormalizedMessage, Topic, TopicKind};
