//! Resilient client connector
//!
//! [`ConnectorHandle::spawn`] starts one driver task per resource. The task
//! owns the [`ConnectorState`], opens connections through a [`Transport`],
//! and reconnects with exponential backoff until the attempts run out or the
//! handle is shut down. Consumers observe the state through a `watch`
//! channel.
//!
//! At most one connection and one pending reconnect timer exist per handle.
//! Shutting down clears the reconnect flag before cancelling, so a timer that
//! is already waiting never opens a new connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::state::{ConnectorState, NextStep, DEFAULT_MAX_RECONNECT_ATTEMPTS};
use super::transport::{resource_url, FrameSink, FrameStream, Transport};
use crate::error::{RelayError, RelayResult};

/// Connector tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub max_reconnect_attempts: u32,
    pub backoff: Backoff,
    /// Outbound frames buffered while the socket is busy
    pub outbound_buffer: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: Backoff::default(),
            outbound_buffer: 64,
        }
    }
}

/// Consumer side of one resource's live channel
pub struct ConnectorHandle {
    url: Option<String>,
    state: watch::Receiver<ConnectorState>,
    outbound: mpsc::Sender<String>,
    should_reconnect: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectorHandle {
    /// Start connecting to `url` on the current Tokio runtime
    pub fn spawn(
        transport: Arc<dyn Transport>,
        url: impl Into<String>,
        config: ConnectorConfig,
    ) -> Self {
        let url = url.into();
        let (state_tx, state_rx) = watch::channel(ConnectorState::new(config.max_reconnect_attempts));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let should_reconnect = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport,
            url: url.clone(),
            backoff: config.backoff,
            state: ConnectorState::new(config.max_reconnect_attempts),
            state_tx,
            outbound_rx,
            should_reconnect: should_reconnect.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            url: Some(url),
            state: state_rx,
            outbound: outbound_tx,
            should_reconnect,
            cancel,
            task: Some(task),
        }
    }

    /// Connector for `resource` under `base_url`.
    ///
    /// A blank resource identifier yields an idle handle that never connects.
    pub fn for_resource(
        transport: Arc<dyn Transport>,
        base_url: &str,
        resource: &str,
        config: ConnectorConfig,
    ) -> Self {
        match resource_url(base_url, resource) {
            Some(url) => Self::spawn(transport, url, config),
            None => Self::idle(config),
        }
    }

    /// A handle with no resource: stays Idle
    pub fn idle(config: ConnectorConfig) -> Self {
        let (_state_tx, state_rx) = watch::channel(ConnectorState::new(config.max_reconnect_attempts));
        let (outbound_tx, _outbound_rx) = mpsc::channel(1);

        Self {
            url: None,
            state: state_rx,
            outbound: outbound_tx,
            should_reconnect: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Endpoint this handle connects to, if any
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ConnectorState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.state.clone()
    }

    /// Stream of state snapshots, starting with the current one
    pub fn updates(&self) -> WatchStream<ConnectorState> {
        WatchStream::new(self.state.clone())
    }

    /// Send a JSON message over the live connection
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> RelayResult<()> {
        if !self.state.borrow().is_connected {
            return Err(RelayError::NotConnected);
        }
        let text = serde_json::to_string(payload)?;
        self.outbound
            .send(text)
            .await
            .map_err(|_| RelayError::NotConnected)
    }

    /// Stop reconnecting and close the connection
    pub fn shutdown(&self) {
        self.should_reconnect.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Wait for the driver task to finish
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "connector task failed");
            }
        }
    }
}

impl Drop for ConnectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Driver {
    transport: Arc<dyn Transport>,
    url: String,
    backoff: Backoff,
    state: ConnectorState,
    state_tx: watch::Sender<ConnectorState>,
    outbound_rx: mpsc::Receiver<String>,
    should_reconnect: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Driver {
    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn reconnect_wanted(&self) -> bool {
        self.should_reconnect.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    async fn run(mut self) {
        while self.state.begin_connect() {
            self.publish();
            tracing::debug!(url = %self.url, attempt = self.state.reconnect_attempts, "connecting");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.transport.connect(&self.url) => Some(result),
            };

            match connected {
                Some(Ok((sink, stream))) => {
                    self.state.on_open();
                    self.publish();
                    tracing::info!(url = %self.url, "live connection open");

                    self.pump(sink, stream).await;
                    tracing::info!(url = %self.url, "live connection closed");
                }
                Some(Err(e)) => {
                    tracing::warn!(url = %self.url, error = %e, "live connection failed");
                    self.state.on_error(e.to_string());
                }
                None => {}
            }

            self.state.on_close();
            // Frames queued for the old connection are not replayed on the next one
            while self.outbound_rx.try_recv().is_ok() {}

            match self.state.next_step(&self.backoff, self.reconnect_wanted()) {
                NextStep::Reconnect { delay, attempt } => {
                    self.publish();
                    tracing::info!(
                        url = %self.url,
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        max = self.state.max_reconnect_attempts,
                        "scheduling reconnect"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if !self.reconnect_wanted() {
                        self.state.terminate();
                    }
                }
                NextStep::Terminate => {}
            }
        }

        tracing::info!(
            url = %self.url,
            attempts = self.state.reconnect_attempts,
            "live connection terminated"
        );
        self.publish();
    }

    /// Move frames in both directions until the connection ends
    async fn pump(&mut self, mut sink: FrameSink, mut stream: FrameStream) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    return;
                }

                Some(text) = self.outbound_rx.recv() => {
                    if let Err(e) = sink.send(text).await {
                        tracing::warn!(url = %self.url, error = %e, "send failed");
                        self.state.on_error(e.to_string());
                        return;
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(text)) => match self.state.on_frame(&text) {
                            Ok(()) => self.publish(),
                            Err(e) => {
                                tracing::warn!(url = %self.url, error = %e, "ignoring malformed message");
                            }
                        },
                        Some(Err(e)) => {
                            tracing::warn!(url = %self.url, error = %e, "connection error");
                            self.state.on_error(e.to_string());
                            return;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}
