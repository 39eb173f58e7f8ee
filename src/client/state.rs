//! Client connection state machine
//!
//! ```text
//! Idle ──► Connecting ──open──► Connected ──frame──► Connected
//!              │                    │
//!        error │              close │
//!              ▼                    ▼
//!          Disconnected ◄───────────┘
//!              │
//!              ├── attempts left && wanted ──(backoff)──► Connecting
//!              └── otherwise ─────────────────────────► Terminated
//! ```
//!
//! The transitions are plain methods on [`ConnectorState`] so the driver
//! task stays a thin loop and the rules can be tested without sockets.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::backoff::Backoff;

/// Default number of reconnects after a connection is lost
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Lifecycle phase of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Final; no further transitions
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What the driver should do after a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Wait `delay`, then open a new connection
    Reconnect { delay: Duration, attempt: u32 },
    /// Stop for good
    Terminate,
}

/// State exposed to the consumer of one resource's live channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorState {
    pub phase: Phase,
    pub is_connected: bool,
    pub last_message: Option<Value>,
    pub error: Option<String>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectorState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }
}

impl ConnectorState {
    pub fn new(max_reconnect_attempts: u32) -> Self {
        Self {
            phase: Phase::Idle,
            is_connected: false,
            last_message: None,
            error: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
        }
    }

    /// Enter Connecting. Refused while a connection is pending or open,
    /// and after termination.
    pub fn begin_connect(&mut self) -> bool {
        match self.phase {
            Phase::Idle | Phase::Disconnected => {
                self.phase = Phase::Connecting;
                true
            }
            Phase::Connecting | Phase::Connected | Phase::Terminated => false,
        }
    }

    /// The transport reported the connection open
    pub fn on_open(&mut self) {
        if self.phase == Phase::Terminated {
            return;
        }
        self.phase = Phase::Connected;
        self.is_connected = true;
        self.reconnect_attempts = 0;
        self.error = None;
    }

    /// An inbound text frame arrived.
    ///
    /// Frames that are not JSON leave `last_message` untouched and return the
    /// parse error for logging.
    pub fn on_frame(&mut self, text: &str) -> Result<(), serde_json::Error> {
        let value = serde_json::from_str::<Value>(text)?;
        self.last_message = Some(value);
        Ok(())
    }

    /// The transport reported an error (including failure to connect)
    pub fn on_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.on_close();
    }

    /// The connection closed
    pub fn on_close(&mut self) {
        self.is_connected = false;
        if self.phase != Phase::Terminated {
            self.phase = Phase::Disconnected;
        }
    }

    /// Decide what follows a disconnect.
    ///
    /// Schedules a reconnect while attempts remain and `should_reconnect`
    /// holds, incrementing `reconnect_attempts`; otherwise terminates.
    pub fn next_step(&mut self, backoff: &Backoff, should_reconnect: bool) -> NextStep {
        if self.phase == Phase::Terminated {
            return NextStep::Terminate;
        }

        if should_reconnect && self.reconnect_attempts < self.max_reconnect_attempts {
            let delay = backoff.delay(self.reconnect_attempts);
            self.reconnect_attempts += 1;
            NextStep::Reconnect {
                delay,
                attempt: self.reconnect_attempts,
            }
        } else {
            self.terminate();
            NextStep::Terminate
        }
    }

    /// Enter the final state
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
        self.is_connected = false;
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Decode the last message into a typed value
    pub fn last_message_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.last_message
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}
