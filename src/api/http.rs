//! HTTP server setup with Axum

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{rooms, stats};
use super::websocket::{ws_resource, ws_root, AppState};

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration - the relay is consumed by browser front ends on other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket on the root path
        .route("/", get(ws_root))
        // Health check
        .route("/health", get(health_check))
        // REST API endpoints
        .route("/api/stats", get(stats::get_stats))
        .route("/api/rooms/*room", post(rooms::publish))
        // Every other path is a resource-scoped WebSocket room
        .fallback(ws_resource)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
