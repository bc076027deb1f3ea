//! WebSocket stream of explorer events

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use grove_explorer::{ExplorerEvent, ViewSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::ServerState;

/// Messages exchanged with a UI client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client asks for the current view
    RequestView,
    /// Keepalive
    Ping,
    Pong,
}

/// Server -> client frames that are not explorer events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    View { view: ViewSnapshot },
    Pong,
    Error { message: String },
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("Failed to serialize websocket message: {}", e);
            None
        }
    }
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.explorer.subscribe();
    // replies to the client, funnelled into the single sender task
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);

    let initial = ServerMessage::View {
        view: state.explorer.snapshot().await,
    };
    if let Some(json) = encode(&initial) {
        if sender.send(Message::Text(json)).await.is_err() {
            warn!("Failed to send initial view to WebSocket client");
            return;
        }
    }

    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => handle_client_message(message, &recv_state).await,
                        Err(e) => Some(ServerMessage::Error {
                            message: format!("invalid message: {}", e),
                        }),
                    };
                    if let Some(json) = reply.as_ref().and_then(encode::<ServerMessage>) {
                        if reply_tx.send(json).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    debug!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => encode::<ExplorerEvent>(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged behind by {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(json) => Some(json),
                    None => break,
                },
            };
            if let Some(json) = frame {
                if sender.send(Message::Text(json)).await.is_err() {
                    debug!("Failed to send message to WebSocket client");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed");
}

async fn handle_client_message(msg: ClientMessage, state: &ServerState) -> Option<ServerMessage> {
    match msg {
        ClientMessage::RequestView => Some(ServerMessage::View {
            view: state.explorer.snapshot().await,
        }),
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::Pong => None,
    }
}
