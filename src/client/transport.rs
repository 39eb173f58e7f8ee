//! Transport seam for the client connector
//!
//! A [`Transport`] opens one connection and hands back a sink for outbound
//! text frames and a stream of inbound text frames. The stream ending means
//! the connection closed. Every call to `connect` must produce a brand-new
//! connection; the connector never reuses a closed one.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{RelayError, RelayResult};

/// Outbound half of a connection
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RelayError> + Send>>;

/// Inbound half of a connection
pub type FrameStream = Pin<Box<dyn Stream<Item = RelayResult<String>> + Send>>;

/// Opens connections to the hub
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> RelayResult<(FrameSink, FrameStream)>;
}

/// WebSocket transport backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> RelayResult<(FrameSink, FrameStream)> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| RelayError::connect(url, e.to_string()))?;

        let (write, read) = ws_stream.split();

        let sink: FrameSink = Box::pin(
            write.with(|text: String| future::ready(Ok::<_, RelayError>(Message::Text(text)))),
        );

        let stream: FrameStream = Box::pin(read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("ignoring non UTF-8 binary frame");
                        None
                    }
                },
                // Close frames end the stream right after; pings are answered by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(RelayError::from(e))),
            })
        }));

        Ok((sink, stream))
    }
}

/// Build the per-resource endpoint from a base URL.
///
/// Each path segment of `resource` is percent-encoded. Returns `None` for a
/// blank resource identifier, in which case no connection should be opened.
pub fn resource_url(base: &str, resource: &str) -> Option<String> {
    let segments: Vec<String> = resource
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();

    if segments.is_empty() {
        return None;
    }

    Some(format!("{}/{}", base.trim_end_matches('/'), segments.join("/")))
}
