//! API module for HTTP and WebSocket endpoints
//!
//! This module serves the relay's WebSocket rooms and its small REST surface.

pub mod http;
pub mod rest;
pub mod websocket;

pub use http::{create_router, serve};
