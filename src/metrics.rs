use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

/// Runtime counters for the streaming subsystem.
///
/// Purpose:
/// - Track active connectors and exchange connections
/// - Track throughput (received / published messages)
/// - Track losses (unrecognized frames, publishes dropped at the queue)
///
/// Design:
/// - Lock-free (Atomics)
/// - Owned by the `StreamManager` and shared by `Arc`, never global
///
/// Units a slow subscriber misses are dropped inside the PUB socket and
/// are not visible here.
#[derive(Default, Debug)]
pub struct RuntimeMetrics {
    // Connectors
    pub connectors_active: AtomicUsize,
    pub ws_connections_active: AtomicUsize,
    pub ws_reconnects: AtomicUsize,
    pub subscriptions_sent: AtomicUsize,
    pub subscription_errors: AtomicUsize,

    // Throughput
    pub messages_received: AtomicUsize,
    pub messages_published: AtomicUsize,
    pub unrecognized_messages: AtomicUsize,
    pub publish_dropped: AtomicUsize,

    // Broker side
    pub units_sent: AtomicUsize,
    pub subscribers_accepted: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    /// Increments `gauge` until the returned guard is dropped, including
    /// when the owning task is aborted.
    pub fn track(gauge: &AtomicUsize) -> GaugeGuard<'_> {
        Self::incr(gauge);
        GaugeGuard(gauge)
    }

    /// One-line summary in the collector's `[METRICS]` format.
    pub fn summary(&self) -> String {
        format!(
            "[METRICS] conn={} ws={} subs={} recv={} pub={} sent={} unrec={} dropped={} reconnects={} sub_send={} sub_send_err={}",
            Self::get(&self.connectors_active),
            Self::get(&self.ws_connections_active),
            Self::get(&self.subscribers_accepted),
            Self::get(&self.messages_received),
            Self::get(&self.messages_published),
            Self::get(&self.units_sent),
            Self::get(&self.unrecognized_messages),
            Self::get(&self.publish_dropped),
            Self::get(&self.ws_reconnects),
            Self::get(&self.subscriptions_sent),
            Self::get(&self.subscription_errors),
        )
    }
}

pub struct GaugeGuard<'a>(&'a AtomicUsize);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        RuntimeMetrics::decr(self.0);
    }
}

/// Starts the periodic metrics reporter (low-noise, one line per period).
///
/// The returned handle is aborted by the manager on stop.
pub fn spawn_reporter(metrics: Arc<RuntimeMetrics>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log::info!("{}", metrics.summary());
        }
    })
}
