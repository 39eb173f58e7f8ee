//! relay-watch: follow live updates for one resource from the terminal
//!
//! Prints every message received over the live connection, switches to
//! polling the REST endpoint once live updates are given up, and sends each
//! line typed on stdin to the room as JSON.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;

use review_relay::client::{
    Backoff, ConnectorConfig, ConnectorState, FeedOptions, FeedStatus, HttpFetcher, LiveFeed,
    PollingFallback, WsTransport, DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
use review_relay::logging::init_tracing;
use review_relay::RelayResult;

#[derive(Parser, Debug)]
#[command(name = "relay-watch")]
#[command(about = "Follow live review updates for one resource", long_about = None)]
struct Args {
    /// Base WebSocket URL of the relay
    #[arg(long, env = "RELAY_URL", default_value = "ws://localhost:8080")]
    url: String,

    /// Resource identifier, e.g. events/42/reviews
    #[arg(short, long)]
    resource: String,

    /// REST endpoint polled when live updates are unavailable
    #[arg(long, env = "RELAY_POLL_URL")]
    poll_url: String,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = 10_000)]
    poll_interval_ms: u64,

    /// Reconnects after the connection is lost
    #[arg(long, default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    max_reconnect_attempts: u32,

    /// Skip the live connection and only poll
    #[arg(long)]
    no_live: bool,
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    init_tracing("warn,review_relay=info");
    let args = Args::parse();

    let fetcher = HttpFetcher::new(args.poll_url.clone())?;
    let polling = PollingFallback::new(fetcher, Duration::from_millis(args.poll_interval_ms));
    let options = FeedOptions {
        live_enabled: !args.no_live,
        connector: ConnectorConfig {
            max_reconnect_attempts: args.max_reconnect_attempts,
            backoff: Backoff::default(),
            ..ConnectorConfig::default()
        },
    };

    let feed = LiveFeed::start(Arc::new(WsTransport), &args.url, &args.resource, polling, options);

    let mut live_updates = feed.live().map(|c| c.updates());
    let mut poll_updates = feed.polling().updates();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut status: Option<FeedStatus> = None;
    let mut last_message: Option<Value> = None;
    let mut last_data: Option<Value> = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            Some(state) = next_live(&mut live_updates) => {
                if state.last_message.is_some() && state.last_message != last_message {
                    last_message = state.last_message.clone();
                    print_value("live", last_message.as_ref());
                }
                if let Some(error) = &state.error {
                    tracing::debug!(error = %error, phase = %state.phase, "live connection error");
                }
            }

            Some(state) = poll_updates.next() => {
                if state.data.is_some() && state.data != last_data {
                    last_data = state.data.clone();
                    print_value("poll", last_data.as_ref());
                }
                if let Some(error) = &state.error {
                    eprintln!("[poll] {}", error);
                }
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = feed.send(&outbound(&line)).await {
                        eprintln!("[send] {}", e);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }

        let current = feed.status();
        if status != Some(current) {
            status = Some(current);
            eprintln!("* {}", current);
        }
    }

    feed.shutdown().await;
    Ok(())
}

/// Next live state, or never when live updates are disabled
async fn next_live(updates: &mut Option<WatchStream<ConnectorState>>) -> Option<ConnectorState> {
    match updates.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// A JSON line is sent as is; anything else becomes a comment
fn outbound(line: &str) -> Value {
    serde_json::from_str(line).unwrap_or_else(|_| json!({"type": "comment", "text": line}))
}

fn print_value(source: &str, value: Option<&Value>) {
    if let Some(value) = value {
        println!("[{}] {}", source, value);
    }
}
