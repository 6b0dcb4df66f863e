use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::broker::PubSubBroker;
use crate::collector::{Connector, ConnectorSettings};
use crate::config::Config;
use crate::error::{Result, StreamerError};
use crate::exchanges;
use crate::metrics::{self, RuntimeMetrics};

/// Process-wide orchestrator for the streaming subsystem.
///
/// Owns the broker and every connector and is the only lifecycle entry
/// point. It is built once by the host's composition root and handed to
/// whatever drives startup and shutdown; there is no global instance.
///
/// Lifecycle:
/// - `start()`: bind the broker, then spawn one task per connector
/// - `stop()`: signal every connector, join (or abort) their tasks,
///   then stop the broker last
///
/// Only a broker bind failure is ever returned from `start()`; connector
/// failures are retried inside their own tasks forever.
pub struct StreamManager {
    broker: Arc<PubSubBroker>,
    connectors: Vec<Arc<Connector>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<RuntimeMetrics>,
    shutdown_timeout: Duration,
    metrics_interval: Option<Duration>,
}

impl StreamManager {
    pub fn new(
        broker: Arc<PubSubBroker>,
        connectors: Vec<Arc<Connector>>,
        metrics: Arc<RuntimeMetrics>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            connectors,
            tasks: Mutex::new(Vec::new()),
            reporter: Mutex::new(None),
            metrics,
            shutdown_timeout,
            metrics_interval: None,
        }
    }

    /// Enables the periodic metrics line while running.
    pub fn with_metrics_interval(mut self, every: Option<Duration>) -> Self {
        self.metrics_interval = every;
        self
    }

    /// Composition root: broker plus one connector per enabled exchange.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let metrics = RuntimeMetrics::new();
        let broker = Arc::new(PubSubBroker::new(&cfg.broker, metrics.clone())?);

        let mut connectors = Vec::new();
        for ex in cfg.enabled_exchanges() {
            let Some(exchange) = exchanges::build_connector(ex) else {
                return Err(StreamerError::Config(format!(
                    "exchange '{}' is not supported",
                    ex.name
                )));
            };

            let settings = ConnectorSettings {
                reconnect_delay: Duration::from_millis(
                    ex.reconnect_delay_ms.unwrap_or(cfg.runtime.reconnect_delay_ms),
                ),
                reconnect_jitter: Duration::from_millis(cfg.runtime.reconnect_jitter_ms),
                connect_timeout: Duration::from_millis(cfg.runtime.connect_timeout_ms),
            };

            log::info!(
                "Registered {} connector ({} symbols) → {}",
                ex.name,
                ex.symbols.len(),
                exchange.endpoint()
            );
            connectors.push(Arc::new(Connector::new(exchange, settings)));
        }

        Ok(Self::new(broker, connectors, metrics, cfg.runtime.shutdown_timeout())
            .with_metrics_interval(cfg.runtime.metrics_interval()))
    }

    /// Binds the broker, then launches every connector.
    ///
    /// A bind failure aborts startup before any connector task exists.
    /// Calling `start()` twice returns `AlreadyStarted`.
    pub async fn start(&self) -> Result<()> {
        log::info!("Starting data streamer...");

        let mut tasks = self.tasks.lock().await;
        self.broker.start().await?;

        for connector in &self.connectors {
            let connector = connector.clone();
            let broker = self.broker.clone();
            let metrics = self.metrics.clone();

            tasks.push(tokio::spawn(async move {
                connector.run(broker, metrics).await;
            }));
        }

        if let Some(every) = self.metrics_interval {
            *self.reporter.lock().await = Some(metrics::spawn_reporter(self.metrics.clone(), every));
        }

        log::info!("All {} exchange connectors started", tasks.len());
        Ok(())
    }

    /// Stops connectors first, then the broker. Idempotent.
    pub async fn stop(&self) {
        log::info!("Stopping data streamer...");

        // (1) cooperative + forced stop signal
        for connector in &self.connectors {
            connector.stop();
        }

        // (2) join every task within the bound, abort stragglers
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for mut task in tasks {
            if timeout(self.shutdown_timeout, &mut task).await.is_err() {
                log::warn!("Connector task did not stop in {:?}, aborting", self.shutdown_timeout);
                task.abort();
                let _ = task.await;
            }
        }

        if let Some(reporter) = self.reporter.lock().await.take() {
            reporter.abort();
        }

        // (3) broker last, so no connector publishes into a closed socket
        self.broker.stop().await;

        log::info!("Data streamer stopped");
    }

    pub fn broker(&self) -> &Arc<PubSubBroker> {
        &self.broker
    }

    pub fn connectors(&self) -> &[Arc<Connector>] {
        &self.connectors
    }

    pub fn metrics(&self) -> &Arc<RuntimeMetrics> {
        &self.metrics
    }

    /// Number of connector tasks currently owned by the manager.
    pub async fn task_count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
