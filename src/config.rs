//! Server configuration
//!
//! Loaded from environment variables with sensible defaults:
//!
//! ```bash
//! RELAY_HOST=0.0.0.0           # bind address
//! RELAY_PORT=8080              # listen port
//! RELAY_SCOPE=path             # "path": one room per URL path, "global": single room
//! RELAY_MAX_CONNECTIONS=500    # per-room cap (unset = unbounded)
//! RELAY_PEER_BUFFER=256        # outbound frames queued per connection
//! ```

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{RelayError, RelayResult};
use crate::hub::{HubLimits, Scope};

/// Default listen port of the relay
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of frames buffered per connection
pub const DEFAULT_PEER_BUFFER: usize = 256;

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub scope: Scope,
    pub max_connections: Option<usize>,
    pub peer_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            scope: Scope::PerPath,
            max_connections: None,
            peer_buffer: DEFAULT_PEER_BUFFER,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("RELAY_HOST")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults.host);

        let port = parse_var(&lookup, "RELAY_PORT")?.unwrap_or(defaults.port);
        let scope = parse_var(&lookup, "RELAY_SCOPE")?.unwrap_or(defaults.scope);
        let max_connections = parse_var::<usize, _>(&lookup, "RELAY_MAX_CONNECTIONS")?;
        if max_connections == Some(0) {
            return Err(RelayError::config(
                "RELAY_MAX_CONNECTIONS",
                "must be greater than zero",
            ));
        }

        let peer_buffer = parse_var(&lookup, "RELAY_PEER_BUFFER")?.unwrap_or(defaults.peer_buffer);
        if peer_buffer == 0 {
            return Err(RelayError::config("RELAY_PEER_BUFFER", "must be greater than zero"));
        }

        Ok(Self {
            host,
            port,
            scope,
            max_connections,
            peer_buffer,
        })
    }

    /// Socket address to bind the listener to
    pub fn bind_addr(&self) -> RelayResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| RelayError::config("RELAY_HOST", format!("{e}")))
    }

    /// Per-room limits derived from this configuration
    pub fn limits(&self) -> HubLimits {
        HubLimits {
            max_connections: self.max_connections,
            peer_buffer: self.peer_buffer,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> RelayResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| RelayError::config(key, format!("'{}': {}", raw, e))),
        _ => Ok(None),
    }
}
