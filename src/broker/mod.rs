//! Topic-addressed fan-out broker.
//!
//! The broker binds one ZeroMQ PUB socket and sends every published
//! unit to it. It knows nothing about who is listening and gives no
//! delivery guarantee.

pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use zeromq::{Endpoint, PubSocket, Socket, SocketEvent, SocketSend};

use crate::config::BrokerConfig;
use crate::error::{Result, StreamerError};
use crate::metrics::RuntimeMetrics;
use crate::schema::Topic;

/// How long `stop()` waits for the writer to send queued units.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a `publish` call. Never an error: publishing is best effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the writer task
    Queued,

    /// Broker not started, or already stopped
    NotRunning,

    /// Queue full or writer gone; the unit was discarded
    Dropped,
}

/// One unit waiting for the writer task.
struct Envelope {
    topic: String,
    payload: String,
}

enum BrokerState {
    Idle,
    Running(Running),
    Stopped,
}

struct Running {
    /// Publishers enqueue here with `try_send`; the writer task owns the
    /// socket and is the only consumer, which serializes units coming
    /// from concurrent connectors.
    queue: mpsc::Sender<Envelope>,
    writer: JoinHandle<()>,
    monitor: JoinHandle<()>,
    endpoint: String,
}

/// ============================================================
/// PubSubBroker
/// ============================================================
///
/// Responsibilities:
/// - Bind the outbound PUB socket exactly once
/// - Accept publishes from any number of connector tasks
///
/// Design constraints:
/// - `publish` must never block a connector and never fail
/// - Each unit goes out as one two-frame message `[topic, payload]`
/// - Subscriber fan-out, prefix filtering and per-subscriber buffering
///   are the PUB socket's; a slow subscriber loses its own units,
///   nobody else's
pub struct PubSubBroker {
    address: Endpoint,
    queue_capacity: usize,
    state: Mutex<BrokerState>,
    metrics: Arc<RuntimeMetrics>,
}

impl PubSubBroker {
    pub fn new(cfg: &BrokerConfig, metrics: Arc<RuntimeMetrics>) -> Result<Self> {
        Ok(Self {
            address: wire::parse_endpoint(&cfg.bind)?,
            queue_capacity: cfg.queue_capacity.max(1),
            state: Mutex::new(BrokerState::Idle),
            metrics,
        })
    }

    /// Binds the socket and starts the writer task.
    ///
    /// CONTRACT:
    /// - Succeeds at most once per broker; later calls return
    ///   `AlreadyStarted`, including after `stop()`
    /// - A bind failure leaves the broker idle and is returned as is
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !matches!(*state, BrokerState::Idle) {
            return Err(StreamerError::AlreadyStarted);
        }

        #[cfg(unix)]
        if let Endpoint::Ipc(Some(path)) = &self.address {
            wire::clear_stale_ipc(path)?;
        }

        let mut socket = PubSocket::new();
        let events = socket.monitor();
        let endpoint = socket
            .bind(&self.address.to_string())
            .await
            .map_err(|source| StreamerError::Bind {
                address: self.address.to_string(),
                source,
            })?
            .to_string();

        let (queue, rx) = mpsc::channel::<Envelope>(self.queue_capacity);
        let writer = tokio::spawn(run_writer(socket, rx, self.metrics.clone()));
        let monitor = tokio::spawn(run_monitor(events, self.metrics.clone()));

        log::info!("Broker bound at {}", endpoint);

        *state = BrokerState::Running(Running {
            queue,
            writer,
            monitor,
            endpoint,
        });
        Ok(())
    }

    /// Publishes one unit under `topic`.
    ///
    /// Behavior:
    /// - No-op (logged) if the broker is not running
    /// - Uses non-blocking `try_send`; drops the unit if the queue is full
    ///
    /// This function must never block the caller.
    pub async fn publish(&self, topic: &Topic, payload: &str) -> PublishOutcome {
        let state = self.state.lock().await;
        let BrokerState::Running(running) = &*state else {
            log::debug!("Broker not running, dropping {}", topic);
            return PublishOutcome::NotRunning;
        };

        let envelope = Envelope {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };

        match running.queue.try_send(envelope) {
            Ok(()) => {
                RuntimeMetrics::incr(&self.metrics.messages_published);
                PublishOutcome::Queued
            }
            Err(e) => {
                RuntimeMetrics::incr(&self.metrics.publish_dropped);
                log::warn!("Broker dropped {}: {}", topic, e);
                PublishOutcome::Dropped
            }
        }
    }

    /// Releases the bound address. Idempotent; later publishes are no-ops.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, BrokerState::Stopped)
        };

        let BrokerState::Running(running) = previous else {
            return;
        };

        let Running {
            queue,
            mut writer,
            monitor,
            endpoint,
        } = running;

        // With the queue closed the writer sends every unit still queued,
        // then closes the socket. Bytes a subscriber has not read by then
        // are lost.
        drop(queue);
        if timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
            log::warn!("Broker writer did not drain in {:?}, aborting", DRAIN_TIMEOUT);
            writer.abort();
            let _ = writer.await;
        }
        monitor.abort();

        #[cfg(unix)]
        if let Endpoint::Ipc(Some(path)) = &self.address {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    log::debug!("Could not remove {}: {}", path.display(), e);
                }
            }
        }

        log::info!("Broker at {} stopped", endpoint);
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, BrokerState::Running(_))
    }

    /// Resolved address subscribers can connect to, while running.
    pub async fn endpoint(&self) -> Option<String> {
        match &*self.state.lock().await {
            BrokerState::Running(r) => Some(r.endpoint.clone()),
            _ => None,
        }
    }

    pub fn address(&self) -> &Endpoint {
        &self.address
    }
}

/// Single writer: owns the PUB socket and sends units in queue order.
async fn run_writer(
    mut socket: PubSocket,
    mut rx: mpsc::Receiver<Envelope>,
    metrics: Arc<RuntimeMetrics>,
) {
    while let Some(env) = rx.recv().await {
        match socket.send(wire::encode_unit(&env.topic, &env.payload)).await {
            Ok(()) => RuntimeMetrics::incr(&metrics.units_sent),
            Err(e) => log::warn!("Broker send failed for {}: {}", env.topic, e),
        }
    }

    for e in socket.close().await {
        log::debug!("Broker socket close: {}", e);
    }
    log::debug!("Broker writer finished");
}

/// Logs subscriber connections reported by the socket monitor.
async fn run_monitor<S>(mut events: S, metrics: Arc<RuntimeMetrics>)
where
    S: Stream<Item = SocketEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        match event {
            SocketEvent::Accepted(endpoint, _) => {
                RuntimeMetrics::incr(&metrics.subscribers_accepted);
                log::info!("Subscriber connected via {}", endpoint);
            }
            SocketEvent::AcceptFailed(e) => log::debug!("Subscriber handshake failed: {}", e),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TopicKind;
    use wire::Subscriber;

    fn broker(bind: &str) -> PubSubBroker {
        let cfg = BrokerConfig {
            bind: bind.into(),
            ..BrokerConfig::default()
        };
        PubSubBroker::new(&cfg, RuntimeMetrics::new()).unwrap()
    }

    fn topic(exchange: &str) -> Topic {
        Topic::new(TopicKind::Trades, exchange).unwrap()
    }

    #[cfg(unix)]
    fn temp_ipc(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "streamer-{}-{}-{}.ipc",
            tag,
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    fn seq_of(payload: &str) -> i64 {
        serde_json::from_str::<serde_json::Value>(payload).unwrap()["seq"]
            .as_i64()
            .unwrap()
    }

    async fn subscribe(b: &PubSubBroker) -> Subscriber {
        let seen = RuntimeMetrics::get(&b.metrics.subscribers_accepted);
        let endpoint = b.endpoint().await.unwrap();
        let sub = Subscriber::connect(&endpoint, "").await.unwrap();
        for _ in 0..100 {
            if RuntimeMetrics::get(&b.metrics.subscribers_accepted) > seen {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // the subscription itself travels after the handshake
        tokio::time::sleep(Duration::from_millis(100)).await;
        sub
    }

    async fn next(sub: &mut Subscriber) -> (String, String) {
        timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn publish_before_start_is_a_noop() {
        let b = broker("tcp://127.0.0.1:0");
        assert_eq!(b.publish(&topic("delta"), "{}").await, PublishOutcome::NotRunning);
        assert_eq!(RuntimeMetrics::get(&b.metrics.messages_published), 0);
    }

    #[tokio::test]
    async fn start_is_accepted_once() {
        let b = broker("tcp://127.0.0.1:0");
        b.start().await.unwrap();
        assert!(matches!(b.start().await, Err(StreamerError::AlreadyStarted)));

        b.stop().await;
        assert!(matches!(b.start().await, Err(StreamerError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = broker("tcp://127.0.0.1:0");
        first.start().await.unwrap();
        let taken = first.endpoint().await.unwrap();

        let second = broker(&taken);
        let err = second.start().await.unwrap_err();
        assert!(matches!(err, StreamerError::Bind { .. }));
        assert!(!second.is_running().await);

        first.stop().await;
    }

    #[tokio::test]
    async fn subscriber_receives_topic_and_payload() {
        let b = broker("tcp://127.0.0.1:0");
        b.start().await.unwrap();
        let mut sub = subscribe(&b).await;
        assert_eq!(RuntimeMetrics::get(&b.metrics.subscribers_accepted), 1);

        assert_eq!(b.publish(&topic("delta"), r#"{"price":1.5}"#).await, PublishOutcome::Queued);

        let unit = next(&mut sub).await;
        assert_eq!(unit, ("trades.delta".to_string(), r#"{"price":1.5}"#.to_string()));

        b.stop().await;
    }

    #[tokio::test]
    async fn topic_prefix_is_filtered_by_the_socket() {
        let b = broker("tcp://127.0.0.1:0");
        b.start().await.unwrap();
        let endpoint = b.endpoint().await.unwrap();
        let mut okx_only = Subscriber::connect(&endpoint, "trades.okx").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        b.publish(&topic("delta"), r#"{"seq":1}"#).await;
        b.publish(&topic("okx"), r#"{"seq":2}"#).await;

        let (t, payload) = next(&mut okx_only).await;
        assert_eq!(t, "trades.okx");
        assert_eq!(seq_of(&payload), 2);

        b.stop().await;
    }

    #[tokio::test]
    async fn concurrent_publishers_never_interleave_units() {
        let b = Arc::new(broker("tcp://127.0.0.1:0"));
        b.start().await.unwrap();
        let mut sub = subscribe(&b).await;

        let mut handles = Vec::new();
        for exchange in ["delta", "okx"] {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    b.publish(&topic(exchange), &format!(r#"{{"seq":{i}}}"#)).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut last = std::collections::HashMap::new();
        for _ in 0..100 {
            let (t, payload) = next(&mut sub).await;
            let seq = seq_of(&payload);
            // per-publisher order is preserved
            let prev = last.insert(t.clone(), seq);
            assert!(prev.is_none_or(|p| p < seq), "{t} went from {prev:?} to {seq}");
        }

        b.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_disables_publish() {
        let b = broker("tcp://127.0.0.1:0");
        b.stop().await;
        b.start().await.ok();
        b.stop().await;
        b.stop().await;

        assert_eq!(b.publish(&topic("delta"), "{}").await, PublishOutcome::NotRunning);
        assert!(b.endpoint().await.is_none());
    }

    #[tokio::test]
    async fn stop_sends_every_queued_unit_first() {
        let b = broker("tcp://127.0.0.1:0");
        b.start().await.unwrap();

        for i in 0..2000 {
            let outcome = b.publish(&topic("delta"), &format!(r#"{{"seq":{i}}}"#)).await;
            assert_eq!(outcome, PublishOutcome::Queued);
        }
        b.stop().await;

        assert_eq!(RuntimeMetrics::get(&b.metrics.units_sent), 2000);
        assert_eq!(RuntimeMetrics::get(&b.metrics.publish_dropped), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let cfg = BrokerConfig {
            bind: "tcp://127.0.0.1:0".into(),
            queue_capacity: 1,
        };
        let b = PubSubBroker::new(&cfg, RuntimeMetrics::new()).unwrap();
        b.start().await.unwrap();

        let outcomes = timeout(Duration::from_secs(1), async {
            let mut out = Vec::new();
            for _ in 0..1000 {
                out.push(b.publish(&topic("delta"), "{}").await);
            }
            out
        })
        .await
        .expect("publish blocked");

        assert!(outcomes.iter().all(|o| *o != PublishOutcome::NotRunning));
        let dropped = outcomes.iter().filter(|o| **o == PublishOutcome::Dropped).count();
        assert_eq!(RuntimeMetrics::get(&b.metrics.publish_dropped), dropped);
        b.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_subscriber_loses_units_without_stalling_others() {
        let path = temp_ipc("slow");
        let b = broker(&format!("ipc://{}", path.display()));
        b.start().await.unwrap();

        let mut fast = subscribe(&b).await;
        // never read until publishing is over
        let mut slow = subscribe(&b).await;

        const UNITS: i64 = 2000;
        let pad = "x".repeat(4096);
        for seq in 0..UNITS {
            let payload = format!(r#"{{"seq":{seq},"pad":"{pad}"}}"#);
            assert_eq!(b.publish(&topic("delta"), &payload).await, PublishOutcome::Queued);

            let (_, got) = timeout(Duration::from_secs(2), fast.recv())
                .await
                .expect("fast subscriber stalled")
                .unwrap();
            assert_eq!(seq_of(&got), seq);
        }

        let mut received = Vec::new();
        while let Ok(Ok((_, payload))) = timeout(Duration::from_millis(300), slow.recv()).await {
            received.push(seq_of(&payload));
        }
        assert!((received.len() as i64) < UNITS, "slow subscriber lost nothing");
        assert!(received.windows(2).all(|w| w[0] < w[1]));

        // losses inside the socket are not publish-queue drops
        assert_eq!(RuntimeMetrics::get(&b.metrics.publish_dropped), 0);

        b.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ipc_socket_is_created_and_removed() {
        let path = temp_ipc("test");
        let b = broker(&format!("ipc://{}", path.display()));

        b.start().await.unwrap();
        assert!(path.exists());

        let mut sub = subscribe(&b).await;
        b.publish(&topic("okx"), "{}").await;
        let (t, _) = next(&mut sub).await;
        assert_eq!(t, "trades.okx");

        b.stop().await;
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_ipc_socket_is_replaced_but_live_one_is_not() {
        let path = temp_ipc("stale");
        // a socket file nobody listens on
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let addr = format!("ipc://{}", path.display());
        let live = broker(&addr);
        live.start().await.unwrap();

        let other = broker(&addr);
        assert!(matches!(other.start().await, Err(StreamerError::Bind { .. })));
        assert!(path.exists());

        live.stop().await;
    }
}
