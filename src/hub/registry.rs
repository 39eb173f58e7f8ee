//! Room registry
//!
//! Maps request paths to [`Hub`] instances. With [`Scope::PerPath`] every
//! resource path (for example `events/42/reviews`) is its own broadcast
//! domain; with [`Scope::Global`] every path shares one hub.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::RwLock;

use super::broadcaster::{Hub, HubLimits, PeerReceiver};
use crate::error::RelayResult;
use crate::types::{ConnectionId, RoomStats};

/// How request paths map to rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// One room per URL path
    #[default]
    PerPath,
    /// A single room for the whole process
    Global,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" | "per-path" | "per_path" => Ok(Self::PerPath),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown scope '{}', expected 'path' or 'global'", other)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerPath => f.write_str("path"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Normalize a raw request path into a room key (`/events/42/` -> `events/42`).
///
/// Segments are percent-decoded; a segment that does not decode to UTF-8 is
/// kept as sent.
pub fn room_key(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Owns every live room of the process
pub struct HubRegistry {
    scope: Scope,
    limits: HubLimits,
    rooms: RwLock<HashMap<String, Arc<Hub>>>,
    ids: Arc<AtomicU64>,
}

impl HubRegistry {
    pub fn new(scope: Scope, limits: HubLimits) -> Self {
        Self {
            scope,
            limits,
            rooms: RwLock::new(HashMap::new()),
            ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    fn open_room(&self, rooms: &mut HashMap<String, Arc<Hub>>, key: String) -> Arc<Hub> {
        rooms
            .entry(key)
            .or_insert_with_key(|key| {
                tracing::debug!(room = %key, "opening room");
                Arc::new(Hub::with_ids(key.clone(), self.limits, self.ids.clone()))
            })
            .clone()
    }

    /// Room key a request path resolves to under the current scope
    pub fn resolve(&self, path: &str) -> String {
        match self.scope {
            Scope::PerPath => room_key(path),
            Scope::Global => String::new(),
        }
    }

    /// Register a new connection in the room for `path`.
    ///
    /// The room lock is held across registration so a concurrent
    /// [`release`](Self::release) cannot close the room underneath it.
    pub fn connect(&self, path: &str) -> RelayResult<(Arc<Hub>, ConnectionId, PeerReceiver)> {
        let key = self.resolve(path);
        let mut rooms = self.rooms.write();
        let hub = self.open_room(&mut rooms, key);

        match hub.on_connect() {
            Ok((id, rx)) => Ok((hub, id, rx)),
            Err(e) => {
                if hub.is_empty() {
                    rooms.remove(hub.room());
                }
                Err(e)
            }
        }
    }

    /// Remove a connection and close its room if it became empty
    pub fn disconnect(&self, hub: &Hub, id: ConnectionId) {
        hub.on_close(id);
        self.release(hub.room());
    }

    /// Get the hub for `path` if the room is currently open
    pub fn get(&self, path: &str) -> Option<Arc<Hub>> {
        self.rooms.read().get(&self.resolve(path)).cloned()
    }

    /// Drop the room if nobody is connected anymore
    pub fn release(&self, room: &str) {
        let mut rooms = self.rooms.write();
        if rooms.get(room).is_some_and(|hub| hub.is_empty()) {
            rooms.remove(room);
            tracing::debug!(room = %room, "closing empty room");
        }
    }

    /// Number of open rooms
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Total connections across every room
    pub fn connection_count(&self) -> usize {
        self.rooms.read().values().map(|hub| hub.connection_count()).sum()
    }

    /// Per-room statistics ordered by room key
    pub fn stats(&self) -> Vec<RoomStats> {
        let mut stats: Vec<RoomStats> = self.rooms.read().values().map(|hub| hub.stats()).collect();
        stats.sort_by(|a, b| a.room.cmp(&b.room));
        stats
    }
}
