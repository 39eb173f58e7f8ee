//! Polling fallback
//!
//! Periodically fetches a REST resource and exposes `{data, error, isLoading}`
//! when live updates are unavailable. There is no retry beyond the fixed
//! interval: a failed fetch keeps the previous data and surfaces `error`
//! until the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State exposed to the consumer of a polled resource
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollState {
    pub data: Option<Value>,
    pub error: Option<String>,
    pub is_loading: bool,
}

/// Fetches the polled resource once
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self) -> RelayResult<Value>;
}

/// `GET` a JSON endpoint with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>) -> RelayResult<Self> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> RelayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> RelayResult<Value> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Clears `is_loading` however the fetch ends, including cancellation
struct LoadingGuard<'a> {
    state: &'a watch::Sender<PollState>,
}

impl<'a> LoadingGuard<'a> {
    fn start(state: &'a watch::Sender<PollState>) -> Self {
        state.send_modify(|s| s.is_loading = true);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.is_loading = false);
    }
}

struct PollInner {
    fetcher: Box<dyn Fetcher>,
    interval: Duration,
    state: watch::Sender<PollState>,
}

/// Periodic fetcher for one REST resource. Cheap to clone.
#[derive(Clone)]
pub struct PollingFallback {
    inner: Arc<PollInner>,
}

impl PollingFallback {
    pub fn new(fetcher: impl Fetcher, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            inner: Arc::new(PollInner {
                fetcher: Box::new(fetcher),
                interval,
                state,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PollState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.inner.state.subscribe()
    }

    /// Stream of state snapshots, starting with the current one
    pub fn updates(&self) -> WatchStream<PollState> {
        WatchStream::new(self.subscribe())
    }

    /// Fetch once and apply the outcome.
    ///
    /// Success replaces `data` and clears `error`; failure sets `error` and
    /// leaves `data` untouched.
    pub async fn fetch_once(&self) {
        let state = &self.inner.state;
        let _loading = LoadingGuard::start(state);

        match self.inner.fetcher.fetch().await {
            Ok(data) => state.send_modify(|s| {
                s.data = Some(data);
                s.error = None;
            }),
            Err(e) => {
                tracing::warn!(error = %e, "poll failed");
                state.send_modify(|s| s.error = Some(e.to_string()));
            }
        }
    }

    /// Fetch now, then every `interval` until the returned task is stopped
    pub fn start(&self) -> PollingTask {
        let cancel = CancellationToken::new();
        let poller = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(interval_ms = poller.inner.interval.as_millis() as u64, "polling started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = poller.fetch_once() => {}
                        }
                    }
                }
            }

            tracing::debug!("polling stopped");
        });

        PollingTask {
            cancel,
            task: Some(task),
        }
    }
}

/// Running poll schedule. Dropping it stops polling.
pub struct PollingTask {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingTask {
    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "polling task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
