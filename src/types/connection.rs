use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-unique identity of one WebSocket session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A serialized JSON payload, shared between every peer it is delivered to
pub type Frame = Arc<str>;

/// Snapshot of a registered connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    /// Unix timestamp (seconds) of registration
    pub connected_at: i64,
    /// False once the session stopped draining its queue
    pub open: bool,
}

/// Per-room statistics exposed by `/api/stats`
#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub room: String,
    pub connections: usize,
    pub delivered: u64,
    pub dropped: u64,
}
