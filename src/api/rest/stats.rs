//! Relay statistics endpoint

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::websocket::AppState;
use crate::types::RoomStats;
use crate::utils::{format_uptime, uptime_secs};

/// Response body of `GET /api/stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub scope: String,
    pub total_connections: usize,
    pub rooms: Vec<RoomStats>,
    pub started_at: i64,
    pub uptime_secs: u64,
    pub uptime: String,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let rooms = state.hubs.stats();
    let uptime = uptime_secs(state.started_at);

    Json(StatsResponse {
        scope: state.hubs.scope().to_string(),
        total_connections: rooms.iter().map(|r| r.connections).sum(),
        rooms,
        started_at: state.started_at.timestamp(),
        uptime_secs: uptime,
        uptime: format_uptime(uptime),
    })
}
