//! Invalidation listener: live signals -> explorer resets

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use grove_core::{ExploreError, NodeId};
use grove_explorer::Explorer;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::message::LiveMessage;

/// Live channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Websocket URL of the push channel. No listener runs when unset.
    pub url: Option<String>,
    pub ping_interval_secs: u64,
    pub reconnect_delay_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            url: None,
            ping_interval_secs: 30,
            reconnect_delay_secs: 5,
        }
    }
}

impl LiveConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("cannot encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a live signal does to local state.
#[async_trait]
pub trait InvalidationTarget: Send + Sync {
    /// Drop all local state and reload from the roots.
    async fn reset(&self) -> Result<(), ExploreError>;

    /// Remember that a node may be stale without evicting anything.
    async fn mark_stale(&self, id: &NodeId);
}

#[async_trait]
impl InvalidationTarget for Explorer {
    async fn reset(&self) -> Result<(), ExploreError> {
        self.refresh().await.map(|_| ())
    }

    async fn mark_stale(&self, id: &NodeId) {
        self.note_stale(id).await;
    }
}

/// How one message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Reset,
    Stale(NodeId),
    Ignored,
}

/// How a websocket session ended.
enum SessionEnd {
    Closed,
    Shutdown,
}

pub struct InvalidationListener {
    target: Arc<dyn InvalidationTarget>,
}

impl InvalidationListener {
    pub fn new(target: Arc<dyn InvalidationTarget>) -> Self {
        InvalidationListener { target }
    }

    pub async fn handle(&self, message: LiveMessage) -> Dispatch {
        match message {
            LiveMessage::GraphUpdated {
                added_count,
                modified_count,
                removed_count,
                ..
            } => {
                info!(
                    "Graph updated (+{} ~{} -{}), resetting",
                    added_count, modified_count, removed_count
                );
                if let Err(e) = self.target.reset().await {
                    warn!("Reset after graph update failed: {}", e);
                }
                Dispatch::Reset
            }
            LiveMessage::NodeUpdated { data } => {
                debug!("Node {} updated upstream", data.node_id);
                self.target.mark_stale(&data.node_id).await;
                Dispatch::Stale(data.node_id)
            }
            LiveMessage::Error { message } => {
                warn!("Live channel reported an error: {}", message);
                Dispatch::Ignored
            }
            other => {
                debug!("Ignoring live message {:?}", other);
                Dispatch::Ignored
            }
        }
    }

    /// Parse and dispatch one text frame. Malformed JSON is logged and ignored.
    pub async fn handle_text(&self, text: &str) -> Dispatch {
        match LiveMessage::parse(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                warn!("Dropping malformed live message: {}", e);
                Dispatch::Ignored
            }
        }
    }

    /// Consume text frames until the stream ends. Returns how many were received.
    pub async fn listen<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = String> + Send,
    {
        let mut stream = std::pin::pin!(stream);
        let mut received = 0;
        while let Some(text) = stream.next().await {
            received += 1;
            self.handle_text(&text).await;
        }
        received
    }

    /// Follow the websocket at `url`, reconnecting after `reconnect_delay` whenever the
    /// channel drops, until `shutdown` changes or its sender goes away.
    pub async fn run(
        &self,
        url: &str,
        ping_interval: Duration,
        reconnect_delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            match self.session(url, ping_interval, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!("Live channel {} closed", url),
                Err(e) => warn!("Live channel {} failed: {}", url, e),
            }
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
            debug!("Reconnecting to {}", url);
        }
        info!("Live listener stopped");
    }

    async fn session(
        &self,
        url: &str,
        ping_interval: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, LiveError> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        info!("Connected to live channel {}", url);

        let (mut sender, mut receiver) = socket.split();
        let ping = serde_json::to_string(&LiveMessage::Ping)?;
        let mut ticker = tokio::time::interval(ping_interval);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = receiver.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = ticker.tick() => {
                    sender.send(Message::Text(ping.clone())).await?;
                }
                _ = shutdown.changed() => {
                    let _ = sender.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        resets: Mutex<usize>,
        stale: Mutex<Vec<NodeId>>,
    }

    #[async_trait]
    impl InvalidationTarget for Recorder {
        async fn reset(&self) -> Result<(), ExploreError> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }

        async fn mark_stale(&self, id: &NodeId) {
            self.stale.lock().unwrap().push(id.clone());
        }
    }

    impl Recorder {
        fn resets(&self) -> usize {
            *self.resets.lock().unwrap()
        }

        fn stale(&self) -> Vec<NodeId> {
            self.stale.lock().unwrap().clone()
        }
    }

    fn listener() -> (Arc<Recorder>, InvalidationListener) {
        let recorder = Arc::new(Recorder::default());
        let listener = InvalidationListener::new(Arc::clone(&recorder) as Arc<dyn InvalidationTarget>);
        (recorder, listener)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_graph_updated_resets_and_node_updated_only_records() {
        let (recorder, listener) = listener();

        let first = listener
            .handle_text(r#"{"type":"node_updated","data":{"node_id":"fn1"}}"#)
            .await;
        let second = listener.handle_text(r#"{"type":"graph_updated"}"#).await;

        assert_eq!(first, Dispatch::Stale("fn1".into()));
        assert_eq!(second, Dispatch::Reset);
        assert_eq!(recorder.resets(), 1);
        assert_eq!(recorder.stale(), vec![NodeId::from("fn1")]);
    }

    #[tokio::test]
    async fn test_noise_is_ignored() {
        let (recorder, listener) = listener();

        for text in [
            r#"{"type":"connected","message":"hello"}"#,
            r#"{"type":"heartbeat","timestamp":1700000000.5}"#,
            r#"{"type":"file_changed","path":"app/models.py","change_type":"modified"}"#,
            r#"{"type":"mystery"}"#,
            "not json",
        ] {
            assert_eq!(listener.handle_text(text).await, Dispatch::Ignored);
        }
        assert_eq!(recorder.resets(), 0);
    }

    #[tokio::test]
    async fn test_listen_consumes_stream() {
        let (recorder, listener) = listener();
        let frames = futures_util::stream::iter(vec![
            r#"{"type":"graph_updated"}"#.to_string(),
            r#"{"type":"pong"}"#.to_string(),
            r#"{"type":"graph_updated"}"#.to_string(),
        ]);

        let received = listener.listen(frames).await;

        assert_eq!(received, 3);
        assert_eq!(recorder.resets(), 2);
    }

    #[tokio::test]
    async fn test_websocket_session_pings_and_dispatches() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());
        let (pinged_tx, pinged_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = server.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"connected"}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"graph_updated"}"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if frame == Message::Text(r#"{"type":"ping"}"#.to_string()) {
                    let _ = pinged_tx.send(());
                    break;
                }
            }
            ws.send(Message::Text(
                r#"{"type":"node_updated","data":{"node_id":"mod1"}}"#.to_string(),
            ))
            .await
            .unwrap();
            // keep the socket open until the client leaves
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (recorder, listener) = listener();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = tokio::spawn(async move {
            listener
                .run(&url, Duration::from_millis(20), Duration::from_millis(20), shutdown_rx)
                .await
        });

        pinged_rx.await.unwrap();
        eventually(|| recorder.stale() == vec![NodeId::from("mod1")]).await;
        assert_eq!(recorder.resets(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_channel_drops() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());

        tokio::spawn(async move {
            // first connection is dropped straight away
            let (tcp, _) = server.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();

            let (tcp, _) = server.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"graph_updated"}"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (recorder, listener) = listener();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = tokio::spawn(async move {
            listener
                .run(&url, Duration::from_secs(30), Duration::from_millis(20), shutdown_rx)
                .await
        });

        eventually(|| recorder.resets() == 1).await;

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
    }
}
