//! Data types shared by the hub and the HTTP API

mod connection;

pub use connection::{ConnectionId, ConnectionInfo, Frame, RoomStats};
