//! Error types for the relay

use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur in the hub, the client connector or the polling fallback
#[derive(Error, Debug)]
pub enum RelayError {
    /// A configuration value could not be parsed
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    /// The room refused a new connection because it reached its limit
    #[error("Room '{room}' is full ({limit} connections)")]
    HubFull { room: String, limit: usize },

    /// Opening a transport connection failed
    #[error("Connection failed to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A send was attempted while no live connection is open
    #[error("Live connection is not open")]
    NotConnected,

    /// The polled endpoint answered with a non-success status
    #[error("Request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Create a configuration error
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection failed error
    pub fn connect(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
