//! Broadcast hub
//!
//! A [`Hub`] owns the set of live connections of one room and relays every
//! valid JSON message it receives from one connection to all the others.
//!
//! # Design
//!
//! Each connection is represented by the sending half of a bounded queue.
//! The session task owning the socket drains the receiving half, so the hub
//! itself never awaits: fan-out is a `try_send` per peer under a read lock.
//! A peer whose session has ended has a closed queue and is skipped until its
//! close handler removes it.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::IgnoredAny;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{RelayError, RelayResult};
use crate::types::{ConnectionId, ConnectionInfo, Frame, RoomStats};
use crate::utils::current_timestamp;

/// Receiving half of a connection's outbound queue
pub type PeerReceiver = mpsc::Receiver<Frame>;

/// Explicit bounds applied to a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubLimits {
    /// Maximum simultaneous connections (`None` = unbounded)
    pub max_connections: Option<usize>,
    /// Frames queued per connection before new frames are dropped for it
    pub peer_buffer: usize,
}

impl Default for HubLimits {
    fn default() -> Self {
        Self {
            max_connections: None,
            peer_buffer: crate::config::DEFAULT_PEER_BUFFER,
        }
    }
}

struct Peer {
    tx: mpsc::Sender<Frame>,
    connected_at: i64,
}

/// Fan-out group for one room
pub struct Hub {
    room: String,
    limits: HubLimits,
    peers: RwLock<HashMap<ConnectionId, Peer>>,
    ids: Arc<AtomicU64>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Hub {
    /// Create a standalone hub with its own id sequence
    pub fn new(room: impl Into<String>, limits: HubLimits) -> Self {
        Self::with_ids(room, limits, Arc::new(AtomicU64::new(1)))
    }

    /// Create a hub drawing connection ids from a shared sequence
    pub fn with_ids(room: impl Into<String>, limits: HubLimits, ids: Arc<AtomicU64>) -> Self {
        Self {
            room: room.into(),
            limits,
            peers: RwLock::new(HashMap::new()),
            ids,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Room key this hub serves
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Whether another connection would be accepted right now
    pub fn has_capacity(&self) -> bool {
        match self.limits.max_connections {
            Some(max) => self.peers.read().len() < max,
            None => true,
        }
    }

    /// Register a new connection.
    ///
    /// Returns its id and the queue the session must drain into its socket.
    pub fn on_connect(&self) -> RelayResult<(ConnectionId, PeerReceiver)> {
        let mut peers = self.peers.write();
        if let Some(max) = self.limits.max_connections {
            if peers.len() >= max {
                tracing::warn!(room = %self.room, limit = max, "rejecting connection, room is full");
                return Err(RelayError::HubFull {
                    room: self.room.clone(),
                    limit: max,
                });
            }
        }

        let id = ConnectionId(self.ids.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.limits.peer_buffer.max(1));
        peers.insert(
            id,
            Peer {
                tx,
                connected_at: current_timestamp(),
            },
        );

        tracing::info!(room = %self.room, connection = %id, total = peers.len(), "client connected");
        Ok((id, rx))
    }

    /// Handle a raw text frame received from `from`.
    ///
    /// The frame must be valid JSON and is relayed byte for byte. Invalid
    /// JSON is logged and dropped; nothing is sent back to the sender.
    /// Returns the number of peers the message was queued for.
    pub fn on_message(&self, from: ConnectionId, raw: &str) -> usize {
        match serde_json::from_str::<IgnoredAny>(raw) {
            Ok(_) => self.fan_out(Arc::from(raw), Some(from)),
            Err(e) => {
                tracing::warn!(room = %self.room, connection = %from, error = %e, "dropping malformed message");
                0
            }
        }
    }

    /// Queue `payload` for every open connection except `exclude`.
    ///
    /// The payload is serialized once. Returns the number of peers the frame
    /// was queued for.
    pub fn broadcast(&self, payload: &Value, exclude: Option<ConnectionId>) -> usize {
        match serde_json::to_string(payload) {
            Ok(json) => self.fan_out(Arc::from(json), exclude),
            Err(e) => {
                tracing::error!(room = %self.room, error = %e, "failed to serialize payload");
                0
            }
        }
    }

    /// Queue `frame` for every open connection except `exclude`.
    /// A full or closed peer queue only affects that peer.
    fn fan_out(&self, frame: Frame, exclude: Option<ConnectionId>) -> usize {
        let peers = self.peers.read();
        let mut delivered = 0;

        for (id, peer) in peers.iter() {
            if Some(*id) == exclude || peer.tx.is_closed() {
                continue;
            }

            match peer.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(room = %self.room, connection = %id, "peer queue full, dropping frame");
                }
                // Session ended between the check and the send
                Err(TrySendError::Closed(_)) => {}
            }
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        tracing::debug!(room = %self.room, from = ?exclude, delivered, "broadcast");
        delivered
    }

    /// Remove a connection after its socket closed
    pub fn on_close(&self, id: ConnectionId) {
        let mut peers = self.peers.write();
        if peers.remove(&id).is_some() {
            tracing::info!(room = %self.room, connection = %id, total = peers.len(), "client disconnected");
        }
    }

    /// Remove a connection after a socket error. The error is logged only.
    pub fn on_error(&self, id: ConnectionId, error: &dyn Display) {
        tracing::warn!(room = %self.room, connection = %id, error = %error, "connection error");
        self.on_close(id);
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Snapshot of registered connections, ordered by id
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<ConnectionInfo> = self
            .peers
            .read()
            .iter()
            .map(|(id, peer)| ConnectionInfo {
                id: *id,
                connected_at: peer.connected_at,
                open: !peer.tx.is_closed(),
            })
            .collect();
        list.sort_by_key(|c| c.id);
        list
    }

    /// Delivery counters for this room
    pub fn stats(&self) -> RoomStats {
        RoomStats {
            room: self.room.clone(),
            connections: self.connection_count(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
