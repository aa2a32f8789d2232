use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::ServerState;

/// Server-to-client event feed: each lifecycle event goes out as one JSON
/// `{type, payload}` text frame.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, state))
}

async fn run(mut socket: WebSocket, state: ServerState) {
    let mut events = state.engine.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    // Dropped events under lag are acceptable; resubscription
                    // is implicit, the receiver just skips ahead.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(event = "ws_lagged", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Ok(payload) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                // One-way feed: drain pings and stop on close.
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
