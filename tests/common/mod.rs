//! Scripted exchange used by the integration tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Local WebSocket server standing in for an exchange.
///
/// - Every subscription frame a client sends is forwarded to
///   `subscriptions`
/// - Frames passed to `push` go out on every open connection
pub struct MockExchange {
    pub url: String,
    pub subscriptions: mpsc::UnboundedReceiver<String>,
    push: broadcast::Sender<String>,
}

impl MockExchange {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (sub_tx, subscriptions) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel::<String>(64);

        let push_tx = push.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sub_tx = sub_tx.clone();
                let mut frames = push_tx.subscribe();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else { return };
                    let (mut write, mut read) = ws.split();

                    if let Some(Ok(Message::Text(sub))) = read.next().await {
                        let _ = sub_tx.send(sub.to_string());
                    }

                    loop {
                        tokio::select! {
                            frame = frames.recv() => match frame {
                                Ok(f) => {
                                    if write.send(Message::Text(f.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                            msg = read.next() => match msg {
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        Self { url, subscriptions, push }
    }

    /// Waits until a client has connected and subscribed.
    pub async fn subscribed(&mut self) -> serde_json::Value {
        let raw = tokio::time::timeout(Duration::from_secs(5), self.subscriptions.recv())
            .await
            .expect("no subscription received")
            .expect("mock exchange gone");
        serde_json::from_str(&raw).unwrap()
    }

    pub fn push(&self, frame: &str) {
        self.push.send(frame.to_string()).expect("no client connected");
    }
}

/// Config with one symbol per `(name, url, symbol)` entry.
pub fn config_json(bind: &str, exchanges: &[(&str, &str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = exchanges
        .iter()
        .map(|(name, url, symbol)| {
            serde_json::json!({
                "name": name,
                "enabled": true,
                "symbols": [symbol],
                "url": url,
            })
        })
        .collect();

    serde_json::json!({
        "broker": { "bind": bind },
        "runtime": {
            "reconnect_delay_ms": 60_000,
            "shutdown_timeout_ms": 2_000,
            "metrics_interval_secs": 0
        },
        "exchanges": entries,
    })
    .to_string()
}
