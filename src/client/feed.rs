//! Live feed: live connection with polling as the degraded mode
//!
//! A [`LiveFeed`] follows one resource. It keeps a [`ConnectorHandle`] for
//! push updates and switches the [`PollingFallback`] on once the live channel
//! is given up (retries exhausted), or right away when live updates are
//! disabled. A new resource identifier means a new feed; dropping the feed
//! tears both halves down.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::connector::{ConnectorConfig, ConnectorHandle};
use super::polling::PollingFallback;
use super::state::ConnectorState;
use super::transport::Transport;
use crate::error::{RelayError, RelayResult};

/// Status indicator shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Live,
    Fallback,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "Connecting to live updates",
            Self::Live => "Live updates connected",
            Self::Fallback => "Using fallback updates",
        };
        f.write_str(label)
    }
}

/// Feed behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// When false, only polling is used
    pub live_enabled: bool,
    pub connector: ConnectorConfig,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            live_enabled: true,
            connector: ConnectorConfig::default(),
        }
    }
}

/// Live updates for one resource with automatic polling fallback
pub struct LiveFeed {
    connector: Option<ConnectorHandle>,
    polling: PollingFallback,
    fallback_active: Arc<AtomicBool>,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Start following `resource` under `base_url`
    pub fn start(
        transport: Arc<dyn Transport>,
        base_url: &str,
        resource: &str,
        polling: PollingFallback,
        options: FeedOptions,
    ) -> Self {
        let connector = options
            .live_enabled
            .then(|| ConnectorHandle::for_resource(transport, base_url, resource, options.connector));

        // An idle connector (blank resource) never goes live
        let live = connector
            .as_ref()
            .filter(|c| c.url().is_some())
            .map(|c| c.subscribe());

        let fallback_active = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            live,
            polling.clone(),
            fallback_active.clone(),
            cancel.clone(),
        ));

        Self {
            connector,
            polling,
            fallback_active,
            cancel,
            supervisor: Some(supervisor),
        }
    }

    /// Current status indicator
    pub fn status(&self) -> FeedStatus {
        if self.connector.as_ref().is_some_and(|c| c.state().is_connected) {
            FeedStatus::Live
        } else if self.fallback_active.load(Ordering::SeqCst) {
            FeedStatus::Fallback
        } else {
            FeedStatus::Connecting
        }
    }

    /// The live half, if live updates are enabled
    pub fn live(&self) -> Option<&ConnectorHandle> {
        self.connector.as_ref()
    }

    /// The polling half
    pub fn polling(&self) -> &PollingFallback {
        &self.polling
    }

    /// Snapshot of the live state, if live updates are enabled
    pub fn live_state(&self) -> Option<ConnectorState> {
        self.connector.as_ref().map(|c| c.state())
    }

    /// Send a JSON message over the live connection
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> RelayResult<()> {
        match &self.connector {
            Some(connector) => connector.send(payload).await,
            None => Err(RelayError::NotConnected),
        }
    }

    /// Tear down both halves and wait for polling to stop
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(connector) = self.connector.as_mut() {
            connector.shutdown();
            connector.join().await;
        }
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                tracing::error!(error = %e, "live feed supervisor failed");
            }
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait for the live channel to terminate, then poll until cancelled
async fn supervise(
    live: Option<watch::Receiver<ConnectorState>>,
    polling: PollingFallback,
    fallback_active: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    if let Some(mut rx) = live {
        loop {
            if rx.borrow_and_update().is_terminated() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = rx.changed() => {
                    // Connector task gone: treat like termination
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("live updates unavailable, switching to polling");
    }

    fallback_active.store(true, Ordering::SeqCst);
    let task = polling.start();
    cancel.cancelled().await;
    fallback_active.store(false, Ordering::SeqCst);
    task.stop().await;
}
