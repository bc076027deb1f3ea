//! HTTP + WebSocket server exposing the explorer's UI actions

pub mod handlers;
pub mod router;
pub mod websocket;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use grove_explorer::Explorer;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

/// Where the local server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared state handed to every handler.
pub struct ServerState {
    pub explorer: Arc<Explorer>,
}

impl ServerState {
    pub fn new(explorer: Arc<Explorer>) -> Self {
        ServerState { explorer }
    }
}

pub struct GroveServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl GroveServer {
    pub fn new(explorer: Arc<Explorer>, config: ServerConfig) -> Self {
        GroveServer {
            state: Arc::new(ServerState::new(explorer)),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(self) -> anyhow::Result<()> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("cannot bind {}", address))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        info!("Grove server listening on http://{}", local);

        let app = router::create_router(self.state);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
