//! WebSocket application state

use chrono::{DateTime, Utc};

use crate::config::RelayConfig;
use crate::hub::{HubLimits, HubRegistry, Scope};

/// Shared application state for the relay endpoints
pub struct AppState {
    /// Rooms and their connections
    pub hubs: HubRegistry,

    /// When the server started, for uptime reporting
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState with the given room scope and limits
    pub fn new(scope: Scope, limits: HubLimits) -> Self {
        Self {
            hubs: HubRegistry::new(scope, limits),
            started_at: Utc::now(),
        }
    }

    /// Create state from the server configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.scope, config.limits())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Scope::default(), HubLimits::default())
    }
}
