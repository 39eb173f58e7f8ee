//! Review Relay
//!
//! Real-time relay for review updates: a WebSocket broadcast hub on the
//! server, and a resilient client that falls back to polling a REST endpoint
//! when live updates are unavailable.
//!
//! # Features
//!
//! - **Rooms per path**: each URL path is its own broadcast room
//! - **Exclusion-aware fan-out**: a message reaches every connection but its sender
//! - **Bounded reconnects**: exponential backoff, capped at 30s, three attempts
//! - **Polling fallback**: `{data, error, isLoading}` refreshed every 10s
//!
//! # Modules
//!
//! - `hub`: Connection sets and broadcast per room
//! - `api`: Axum router with the WebSocket endpoint and REST routes
//! - `client`: Connector, polling fallback and the combined live feed
//! - `config`: Environment-driven server configuration
//! - `types`: Shared data structures (ConnectionId, RoomStats)
//! - `utils`: Utility functions (timestamps, uptime)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use review_relay::client::{FeedOptions, HttpFetcher, LiveFeed, PollingFallback, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> review_relay::RelayResult<()> {
//!     let fetcher = HttpFetcher::new("http://localhost:3000/api/events/42/reviews")?;
//!     let polling = PollingFallback::new(fetcher, Duration::from_secs(10));
//!     let feed = LiveFeed::start(
//!         Arc::new(WsTransport),
//!         "ws://localhost:8080",
//!         "events/42/reviews",
//!         polling,
//!         FeedOptions::default(),
//!     );
//!     println!("{}", feed.status());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use api::websocket::AppState;
pub use client::{ConnectorHandle, ConnectorState, LiveFeed, PollState, PollingFallback};
pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use hub::{Hub, HubLimits, HubRegistry, Scope};
pub use types::{ConnectionId, ConnectionInfo, RoomStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
