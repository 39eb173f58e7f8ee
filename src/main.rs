//! Review Relay - Binary Entry Point
//!
//! This is the main entry point for the relay-server binary.

use std::sync::Arc;

use tokio::net::TcpListener;

use review_relay::api;
use review_relay::logging::{init_tracing, DEFAULT_FILTER};
use review_relay::{AppState, RelayConfig, RelayResult};

#[tokio::main]
async fn main() -> RelayResult<()> {
    init_tracing(DEFAULT_FILTER);

    let config = RelayConfig::from_env()?;
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::from_config(&config));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        scope = %config.scope,
        max_connections = ?config.max_connections,
        version = review_relay::VERSION,
        "relay listening"
    );

    api::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
