//! WebSocket connection handler

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};

use super::state::AppState;
use crate::hub::Hub;
use crate::types::ConnectionId;

/// Close code sent when a room refuses a connection (RFC 6455 "Try Again Later")
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// WebSocket upgrade handler for `/`
pub async fn ws_root(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    upgrade(ws, state, String::new())
}

/// WebSocket upgrade handler for any resource path, e.g. `/events/42/reviews`
pub async fn ws_resource(
    ws: WebSocketUpgrade,
    uri: Uri,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state, uri.path().to_string())
}

fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>, path: String) -> Response {
    let full = state
        .hubs
        .get(&path)
        .is_some_and(|hub| !hub.has_capacity());
    if full {
        return (StatusCode::SERVICE_UNAVAILABLE, "Room is full").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, path))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, path: String) {
    let (hub, id, mut rx) = match state.hubs.connect(&path) {
        Ok(registered) => registered,
        Err(e) => {
            // Room filled up between the upgrade check and registration
            let close = CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: Cow::from(e.to_string()),
            };
            let _ = socket.send(Message::Close(Some(close))).await;
            return;
        }
    };

    loop {
        tokio::select! {
            // Frames relayed from other connections
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                            hub.on_error(id, &e);
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Frames sent by this client
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &mut socket, &hub, id).await {
                            break; // Client requested close
                        }
                    }
                    Some(Err(e)) => {
                        hub.on_error(id, &e);
                        break;
                    }
                    None => break, // Client disconnected
                }
            }
        }
    }

    state.hubs.disconnect(&hub, id);
}

/// Handle a message from the client
/// Returns false if the connection should be closed
async fn handle_client_message(
    msg: Message,
    socket: &mut WebSocket,
    hub: &Hub,
    id: ConnectionId,
) -> bool {
    match msg {
        Message::Text(text) => {
            hub.on_message(id, &text);
            true
        }
        Message::Binary(data) => {
            match std::str::from_utf8(&data) {
                Ok(text) => {
                    hub.on_message(id, text);
                }
                Err(_) => {
                    tracing::debug!(connection = %id, len = data.len(), "ignoring non UTF-8 binary frame");
                }
            }
            true
        }
        Message::Ping(data) => {
            let _ = socket.send(Message::Pong(data)).await;
            true
        }
        Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}
