//! WebSocket endpoint of the relay
//!
//! Every path that is not an HTTP API route accepts a WebSocket upgrade.
//! The path selects the room; text frames holding valid JSON are relayed
//! to every other connection in the same room.

pub mod handler;
pub mod state;

pub use handler::{ws_resource, ws_root};
pub use state::AppState;
