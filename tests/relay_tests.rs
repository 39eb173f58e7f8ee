//! End-to-end tests for Review Relay
//!
//! Each test runs a real relay on an ephemeral port and talks to it with
//! `tokio-tungstenite` clients, the library connector, or `reqwest`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use review_relay::api;
use review_relay::client::{
    Backoff, ConnectorConfig, ConnectorHandle, FeedOptions, FeedStatus, HttpFetcher, LiveFeed,
    PollingFallback, WsTransport,
};
use review_relay::{AppState, HubLimits, RelayError, Scope};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct TestServer {
    addr: String,
    state: Arc<AppState>,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::with_state(AppState::default()).await
    }

    async fn with_state(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(state);
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(api::serve(listener, state.clone(), async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            _shutdown: tx,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn client(&self, path: &str) -> Client {
        let (ws, _) = connect_async(self.ws_url(path)).await.unwrap();
        ws
    }

    /// Wait until the room behind `path` holds exactly `expected` connections
    async fn wait_for_connections(&self, path: &str, expected: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let count = self
                .state
                .hubs
                .get(path)
                .map(|hub| hub.connection_count())
                .unwrap_or(0);
            if count == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "room {} has {} connections, expected {}",
                path,
                count,
                expected
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn send_json(client: &mut Client, value: &Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame as sent on the wire
async fn recv_text(client: &mut Client) -> String {
    loop {
        let msg = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

/// Next text frame parsed as JSON
async fn recv_json(client: &mut Client) -> Value {
    serde_json::from_str(&recv_text(client).await).unwrap()
}

/// Assert no text frame arrives within a short window
async fn assert_silent(client: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET, client.next()).await {
        panic!("unexpected frame: {}", text);
    }
}

#[tokio::test]
async fn test_message_reaches_every_other_connection() {
    let server = TestServer::start().await;
    let path = "/events/42/reviews";

    let mut a = server.client(path).await;
    let mut b = server.client(path).await;
    let mut c = server.client(path).await;
    server.wait_for_connections(path, 3).await;

    // Key order and spacing differ from serde_json's own output
    let message = r#"{"type": "comment", "text": "hi", "author": {"name": "A"}}"#;
    a.send(Message::Text(message.to_string())).await.unwrap();

    assert_eq!(recv_text(&mut b).await, message);
    assert_eq!(recv_text(&mut c).await, message);
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let server = TestServer::start().await;
    let path = "/events/1/reviews";

    let mut a = server.client(path).await;
    let mut b = server.client(path).await;
    server.wait_for_connections(path, 2).await;

    for n in 0..20 {
        send_json(&mut a, &json!({"n": n})).await;
    }
    for n in 0..20 {
        assert_eq!(recv_json(&mut b).await, json!({"n": n}));
    }
}

#[tokio::test]
async fn test_rooms_are_isolated_by_path() {
    let server = TestServer::start().await;

    let mut a = server.client("/events/1/reviews").await;
    let mut b = server.client("/events/1/reviews").await;
    let mut other = server.client("/events/2/reviews").await;
    server.wait_for_connections("/events/1/reviews", 2).await;
    server.wait_for_connections("/events/2/reviews", 1).await;

    send_json(&mut a, &json!({"type": "rating", "value": 5})).await;

    assert_eq!(recv_json(&mut b).await, json!({"type": "rating", "value": 5}));
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn test_global_scope_shares_one_room() {
    let server = TestServer::with_state(AppState::new(Scope::Global, HubLimits::default())).await;

    let mut a = server.client("/events/1/reviews").await;
    let mut b = server.client("/events/2/reviews").await;
    server.wait_for_connections("/", 2).await;

    send_json(&mut a, &json!({"type": "comment", "text": "everyone"})).await;
    assert_eq!(
        recv_json(&mut b).await,
        json!({"type": "comment", "text": "everyone"})
    );
}

#[tokio::test]
async fn test_malformed_message_is_dropped_and_connection_stays_open() {
    let server = TestServer::start().await;
    let path = "/events/42/reviews";

    let mut a = server.client(path).await;
    let mut b = server.client(path).await;
    server.wait_for_connections(path, 2).await;

    a.send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();
    assert_silent(&mut b).await;

    // The sender is still connected and can relay valid messages
    send_json(&mut a, &json!({"type": "comment", "text": "after"})).await;
    assert_eq!(
        recv_json(&mut b).await,
        json!({"type": "comment", "text": "after"})
    );
    assert_eq!(server.state.hubs.get(path).unwrap().connection_count(), 2);
}

#[tokio::test]
async fn test_closed_connection_is_removed() {
    let server = TestServer::start().await;
    let path = "/events/42/reviews";

    let mut a = server.client(path).await;
    let mut b = server.client(path).await;
    let mut c = server.client(path).await;
    server.wait_for_connections(path, 3).await;

    b.close(None).await.unwrap();
    server.wait_for_connections(path, 2).await;

    send_json(&mut a, &json!({"n": 1})).await;
    assert_eq!(recv_json(&mut c).await, json!({"n": 1}));
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_eq!(server.state.hubs.get(path).unwrap().stats().delivered, 1);

    drop(a);
    drop(c);
    server.wait_for_connections(path, 0).await;
    assert!(server.state.hubs.get(path).is_none());
}

#[tokio::test]
async fn test_full_room_refuses_connection() {
    let limits = HubLimits {
        max_connections: Some(1),
        ..HubLimits::default()
    };
    let server = TestServer::with_state(AppState::new(Scope::PerPath, limits)).await;
    let path = "/events/42/reviews";

    let _first = server.client(path).await;
    server.wait_for_connections(path, 1).await;

    assert!(connect_async(server.ws_url(path)).await.is_err());
    assert_eq!(server.state.hubs.get(path).unwrap().connection_count(), 1);

    // Other rooms are unaffected
    let _other = server.client("/events/43/reviews").await;
    server.wait_for_connections("/events/43/reviews", 1).await;
}

#[tokio::test]
async fn test_publish_over_rest() {
    let server = TestServer::start().await;
    let path = "/events/42/reviews";

    let mut a = server.client(path).await;
    server.wait_for_connections(path, 1).await;

    let client = reqwest::Client::new();
    let response = client
        .post(server.http_url("/api/rooms/events/42/reviews"))
        .json(&json!({"type": "review_added", "id": 7}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["delivered"], 1);

    assert_eq!(
        recv_json(&mut a).await,
        json!({"type": "review_added", "id": 7})
    );

    let stats: Value = client
        .get(server.http_url("/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_connections"], 1);
    assert_eq!(stats["scope"], "path");
}

#[tokio::test]
async fn test_publish_to_percent_encoded_resource() {
    let server = TestServer::start().await;

    let handle = ConnectorHandle::for_resource(
        Arc::new(WsTransport),
        &format!("ws://{}", server.addr),
        "events/summer fest/reviews",
        ConnectorConfig::default(),
    );
    assert_eq!(
        handle.url(),
        Some(format!("ws://{}/events/summer%20fest/reviews", server.addr).as_str())
    );
    let mut rx = handle.subscribe();
    timeout(WAIT, rx.wait_for(|s| s.is_connected))
        .await
        .unwrap()
        .unwrap();

    let response = reqwest::Client::new()
        .post(server.http_url("/api/rooms/events/summer%20fest/reviews"))
        .json(&json!({"type": "review_added", "id": 11}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let state = timeout(WAIT, rx.wait_for(|s| s.last_message.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state.last_message, Some(json!({"type": "review_added", "id": 11})));
}

#[tokio::test]
async fn test_connector_round_trip() {
    let server = TestServer::start().await;
    let path = "/events/7/reviews";

    let base = format!("ws://{}", server.addr);
    let handle = ConnectorHandle::for_resource(
        Arc::new(WsTransport),
        &base,
        "events/7/reviews",
        ConnectorConfig::default(),
    );
    let mut rx = handle.subscribe();
    timeout(WAIT, rx.wait_for(|s| s.is_connected))
        .await
        .unwrap()
        .unwrap();

    let mut peer = server.client(path).await;
    server.wait_for_connections(path, 2).await;

    // Inbound: peer -> connector
    send_json(&mut peer, &json!({"type": "comment", "text": "from peer"})).await;
    let state = timeout(WAIT, rx.wait_for(|s| s.last_message.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(
        state.last_message,
        Some(json!({"type": "comment", "text": "from peer"}))
    );

    // Outbound: connector -> peer
    handle
        .send(&json!({"type": "comment", "text": "from connector"}))
        .await
        .unwrap();
    assert_eq!(
        recv_json(&mut peer).await,
        json!({"type": "comment", "text": "from connector"})
    );

    handle.shutdown();
    let state = timeout(WAIT, rx.wait_for(|s| s.is_terminated()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert!(!state.is_connected);
    server.wait_for_connections(path, 1).await;
}

#[tokio::test]
async fn test_connector_gives_up_without_server() {
    // Reserve a free port, then release it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ConnectorConfig {
        backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(40)),
        ..ConnectorConfig::default()
    };
    let handle = ConnectorHandle::spawn(
        Arc::new(WsTransport),
        format!("ws://{}/events/1/reviews", addr),
        config,
    );

    let mut rx = handle.subscribe();
    let state = timeout(WAIT, rx.wait_for(|s| s.is_terminated()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state.reconnect_attempts, 3);
    assert!(state.error.is_some());
    assert!(matches!(
        handle.send(&json!({"n": 1})).await,
        Err(RelayError::NotConnected)
    ));
}

/// Calls seen by the reviews endpoint and how many of them fail
#[derive(Clone)]
struct ReviewsApi {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

async fn reviews(State(api): State<ReviewsApi>) -> Result<Json<Value>, StatusCode> {
    if api.calls.fetch_add(1, Ordering::SeqCst) < api.failures {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({"reviews": [{"id": 1, "rating": 5}]})))
}

/// REST resource that fails `failures` times before answering
async fn start_reviews_api(failures: usize) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/events/42/reviews", get(reviews))
        .with_state(ReviewsApi {
            calls: calls.clone(),
            failures,
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}/api/events/42/reviews", addr), calls)
}

#[tokio::test]
async fn test_http_polling_recovers_after_failure() {
    let (url, calls) = start_reviews_api(1).await;
    let polling = PollingFallback::new(HttpFetcher::new(url).unwrap(), Duration::from_secs(10));

    polling.fetch_once().await;
    let state = polling.state();
    assert_eq!(state.data, None);
    assert!(state.error.as_deref().unwrap().contains("500"));
    assert!(!state.is_loading);

    polling.fetch_once().await;
    let state = polling.state();
    assert_eq!(state.data, Some(json!({"reviews": [{"id": 1, "rating": 5}]})));
    assert_eq!(state.error, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_live_feed_against_running_relay() {
    let server = TestServer::start().await;
    let (poll_url, calls) = start_reviews_api(0).await;

    let polling = PollingFallback::new(HttpFetcher::new(poll_url).unwrap(), Duration::from_secs(10));
    let feed = LiveFeed::start(
        Arc::new(WsTransport),
        &format!("ws://{}", server.addr),
        "events/42/reviews",
        polling,
        FeedOptions::default(),
    );

    server.wait_for_connections("/events/42/reviews", 1).await;
    let mut rx = feed.live().unwrap().subscribe();
    timeout(WAIT, rx.wait_for(|s| s.is_connected))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(feed.status(), FeedStatus::Live);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    feed.shutdown().await;
    server.wait_for_connections("/events/42/reviews", 0).await;
}
