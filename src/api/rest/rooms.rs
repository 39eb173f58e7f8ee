//! Server-originated publishing into a room

use std::sync::Arc;

use axum::{extract::State, http::Uri, Json};
use serde::Serialize;
use serde_json::Value;

use super::ApiError;
use crate::api::websocket::AppState;

/// Response body of `POST /api/rooms/*room`
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub room: String,
    pub delivered: usize,
}

/// Route prefix in front of the room path
pub const ROOMS_PREFIX: &str = "/api/rooms/";

/// POST /api/rooms/*room - relay the JSON body to every connection in the room
///
/// The room is taken from the raw request path so it is decoded exactly
/// like the WebSocket side does.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    Json(payload): Json<Value>,
) -> Result<Json<PublishResponse>, ApiError> {
    let room = uri.path().strip_prefix(ROOMS_PREFIX).unwrap_or_default();
    let hub = state
        .hubs
        .get(&room)
        .ok_or_else(|| ApiError::not_found(format!("No open room '{}'", room)))?;

    let delivered = hub.broadcast(&payload, None);
    tracing::debug!(room = %hub.room(), delivered, "published from REST");

    Ok(Json(PublishResponse {
        room: hub.room().to_string(),
        delivered,
    }))
}
