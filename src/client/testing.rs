//! In-process transports and fetchers for client tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, SinkExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use super::polling::Fetcher;
use super::transport::{FrameSink, FrameStream, Transport};
use crate::error::{RelayError, RelayResult};

/// Refuses every connection and records when it was asked
#[derive(Default)]
pub struct RefusingTransport {
    attempts: Mutex<Vec<Instant>>,
}

impl RefusingTransport {
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Transport for RefusingTransport {
    async fn connect(&self, url: &str) -> RelayResult<(FrameSink, FrameStream)> {
        self.attempts.lock().push(Instant::now());
        Err(RelayError::connect(url, "connection refused"))
    }
}

/// Accepts every connection; the connection stays open and silent
#[derive(Default)]
pub struct SilentTransport;

#[async_trait]
impl Transport for SilentTransport {
    async fn connect(&self, _url: &str) -> RelayResult<(FrameSink, FrameStream)> {
        let sink: FrameSink = Box::pin(
            futures::sink::drain::<String>()
                .sink_map_err(|e: std::convert::Infallible| -> RelayError { match e {} }),
        );
        let stream: FrameStream = Box::pin(stream::pending::<RelayResult<String>>());
        Ok((sink, stream))
    }
}

/// Always returns the same value and counts calls
pub struct CountingFetcher {
    value: Value,
    calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn new(value: Value) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                value,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self) -> RelayResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}
