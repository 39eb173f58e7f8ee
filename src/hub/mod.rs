//! Server-side broadcast hub
//!
//! - [`Hub`]: connection set of one room with exclusion-aware fan-out
//! - [`HubRegistry`]: rooms keyed by request path

pub mod broadcaster;
pub mod registry;

pub use broadcaster::{Hub, HubLimits, PeerReceiver};
pub use registry::{room_key, HubRegistry, Scope};
