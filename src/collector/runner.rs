use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rand::random_range;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    broker::{PubSubBroker, PublishOutcome},
    exchanges::connector::ExchangeConnector,
    metrics::RuntimeMetrics,
    schema::Topic,
};

/// Upper bound for the close handshake when stopping mid-stream.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of one connector.
///
/// ```text
/// Disconnected → Connecting → Subscribed → Streaming
///       ↑                                      │ error / remote close
///       └──────────── (delay) ─────────────────┘
/// any state ── stop() ──→ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub reconnect_delay: Duration,
    pub reconnect_jitter: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            reconnect_jitter: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// How one connection ended.
enum SessionEnd {
    /// `stop()` was called; leave without waiting
    Stopped,

    /// The exchange closed the stream
    Closed,
}

/// Runs one exchange connector for the lifetime of the process.
///
/// RESPONSIBILITIES:
/// - Connection lifecycle and subscription sending
/// - Publishing normalized messages in arrival order
/// - Reconnecting after a fixed delay on any failure
///
/// NOT RESPONSIBLE FOR:
/// - Message parsing (connector responsibility)
/// - Delivery to subscribers (broker responsibility)
///
/// Stopping is both cooperative (`running` is checked before every
/// reconnect) and forced (the stop signal interrupts a pending connect,
/// read or reconnect delay).
pub struct Connector {
    exchange: Arc<dyn ExchangeConnector>,
    settings: ConnectorSettings,
    running: AtomicBool,
    stop_signal: watch::Sender<bool>,
    state: watch::Sender<ConnectorState>,
}

impl Connector {
    pub fn new(exchange: Arc<dyn ExchangeConnector>, settings: ConnectorSettings) -> Self {
        Self {
            exchange,
            settings,
            running: AtomicBool::new(false),
            stop_signal: watch::Sender::new(false),
            state: watch::Sender::new(ConnectorState::Disconnected),
        }
    }

    pub fn name(&self) -> &str {
        self.exchange.name()
    }

    pub fn endpoint(&self) -> &str {
        self.exchange.endpoint()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectorState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            log::debug!("[{}] {:?} -> {:?}", self.name(), prev, next);
        }
    }

    /// Signals the loop to exit and interrupts any blocked await.
    ///
    /// Safe to call at any time, any number of times. A connector that
    /// was stopped before `run` started never connects.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.send_replace(true);
    }

    /// The connect / subscribe / stream / retry loop.
    ///
    /// GUARANTEES:
    /// - Never returns while running; only `stop()` ends it
    /// - Errors are logged and followed by the reconnect delay
    pub async fn run(&self, broker: Arc<PubSubBroker>, metrics: Arc<RuntimeMetrics>) {
        let mut stop_rx = self.stop_signal.subscribe();
        if *stop_rx.borrow_and_update() {
            self.set_state(ConnectorState::Stopped);
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let _active = RuntimeMetrics::track(&metrics.connectors_active);

        while self.is_running() {
            self.set_state(ConnectorState::Connecting);

            match self.stream_session(&broker, &metrics, &mut stop_rx).await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Closed) => {
                    log::warn!("[{}] connection closed by exchange", self.name());
                }
                Err(e) => {
                    log::error!("[{}] connection error: {:#}", self.name(), e);
                }
            }

            self.set_state(ConnectorState::Disconnected);
            if !self.is_running() {
                break;
            }

            let delay = self.next_delay();
            log::info!("[{}] reconnecting in {:?}", self.name(), delay);
            RuntimeMetrics::incr(&metrics.ws_reconnects);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = stopped(&mut stop_rx) => break,
            }
        }

        self.set_state(ConnectorState::Stopped);
        log::info!("[{}] connector stopped", self.name());
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.settings.reconnect_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.settings.reconnect_delay;
        }
        self.settings.reconnect_delay + Duration::from_millis(random_range(0..=jitter_ms))
    }

    /// One connection: connect, subscribe, then read until it ends.
    async fn stream_session(
        &self,
        broker: &PubSubBroker,
        metrics: &RuntimeMetrics,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<SessionEnd> {
        let url = self.exchange.endpoint();
        log::info!("[{}] connecting to {}", self.name(), url);

        let connect = timeout(self.settings.connect_timeout, connect_async(url));
        let ws = tokio::select! {
            res = connect => {
                let (ws, _) = res
                    .map_err(|_| anyhow::anyhow!("connect timed out after {:?}", self.settings.connect_timeout))?
                    .with_context(|| format!("connect to {}", url))?;
                ws
            }
            _ = stopped(stop_rx) => return Ok(SessionEnd::Stopped),
        };

        let _connected = RuntimeMetrics::track(&metrics.ws_connections_active);
        self.stream_connected(ws, broker, metrics, stop_rx).await
    }

    async fn stream_connected<S>(
        &self,
        ws: tokio_tungstenite::WebSocketStream<S>,
        broker: &PubSubBroker,
        metrics: &RuntimeMetrics,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<SessionEnd>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws.split();

        // Build and send subscription message
        let sub = self.exchange.subscription_request();
        if let Err(e) = write.send(Message::Text(sub.to_string().into())).await {
            RuntimeMetrics::incr(&metrics.subscription_errors);
            return Err(e).context("send subscription");
        }
        RuntimeMetrics::incr(&metrics.subscriptions_sent);
        self.set_state(ConnectorState::Subscribed);
        log::info!("[{}] subscribed", self.name());

        let heartbeat = self.exchange.heartbeat();
        let mut ping = tokio::time::interval(
            heartbeat.map_or(Duration::from_secs(3600), |hb| hb.interval),
        );
        // first tick fires immediately
        ping.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = stopped(stop_rx) => {
                    let _ = timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await;
                    return Ok(SessionEnd::Stopped);
                }

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if self.state() != ConnectorState::Streaming {
                            self.set_state(ConnectorState::Streaming);
                        }
                        RuntimeMetrics::incr(&metrics.messages_received);
                        self.dispatch(text.as_str(), broker, metrics).await;
                    }

                    Some(Ok(Message::Close(frame))) => {
                        log::debug!("[{}] close frame: {:?}", self.name(), frame);
                        return Ok(SessionEnd::Closed);
                    }

                    // ping / pong / binary
                    Some(Ok(_)) => {}

                    Some(Err(e)) => return Err(e).context("read"),

                    None => return Ok(SessionEnd::Closed),
                },

                _ = ping.tick(), if heartbeat.is_some() => {
                    if let Some(hb) = heartbeat {
                        write.send(Message::Text(hb.payload.into())).await.context("send heartbeat")?;
                    }
                }
            }
        }
    }

    /// Normalizes one frame and publishes each result in order.
    async fn dispatch(&self, raw: &str, broker: &PubSubBroker, metrics: &RuntimeMetrics) {
        let messages = self.exchange.normalize_message(raw);
        if messages.is_empty() {
            RuntimeMetrics::incr(&metrics.unrecognized_messages);
            log::trace!("[{}] ignored frame: {}", self.name(), raw);
            return;
        }

        for msg in messages {
            let topic = match Topic::new(msg.kind(), self.name()) {
                Ok(t) => t,
                Err(e) => {
                    log::error!("[{}] {}", self.name(), e);
                    continue;
                }
            };

            let payload = match msg.to_payload() {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("[{}] cannot serialize {}: {}", self.name(), topic, e);
                    continue;
                }
            };

            if broker.publish(&topic, &payload).await != PublishOutcome::Queued {
                log::trace!("[{}] publish to {} not queued", self.name(), topic);
            }
        }
    }
}

/// Resolves once the stop signal is set. The channel's read guard is
/// released before this returns, so callers may await afterwards.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}
