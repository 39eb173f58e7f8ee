//! Client side of the relay
//!
//! - [`ConnectorHandle`]: one live connection per resource, reconnecting with
//!   exponential backoff up to a fixed number of attempts
//! - [`PollingFallback`]: periodic REST fetch exposing `{data, error, isLoading}`
//! - [`LiveFeed`]: the two combined, polling once live updates are given up

pub mod backoff;
pub mod connector;
pub mod feed;
pub mod polling;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backoff::Backoff;
pub use connector::{ConnectorConfig, ConnectorHandle};
pub use feed::{FeedOptions, FeedStatus, LiveFeed};
pub use polling::{
    Fetcher, HttpFetcher, PollState, PollingFallback, PollingTask, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use state::{ConnectorState, NextStep, Phase, DEFAULT_MAX_RECONNECT_ATTEMPTS};
pub use transport::{resource_url, FrameSink, FrameStream, Transport, WsTransport};
