use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use super::{ChannelEvent, ChannelKind, PushTransport, StreamParams, TransportError};

/// Push transport over a long-lived streaming HTTP GET.
///
/// The backend emits one JSON event per line; SSE-style framing
/// (`data:` prefixes, `event:`/`retry:` fields, comment lines) is
/// tolerated and stripped so both plain NDJSON and event-stream servers
/// parse identically.
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Result<Self, TransportError> {
        // No global timeout: the stream is meant to stay open. Only the
        // connection establishment is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn stream_url(params: &StreamParams) -> Result<Url, TransportError> {
        let path = match params.kind {
            ChannelKind::Data => "/api/dashboard/stream",
            ChannelKind::Logs => "/api/dashboard/logs/stream",
        };
        let mut url = Url::parse(&format!("{}{}", params.base_url.trim_end_matches('/'), path))
            .map_err(|e| TransportError::Connect(format!("bad stream url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &params.key);
            if let Some(user) = params.user.as_deref() {
                query.append_pair("user", user);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(
        &self,
        params: StreamParams,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        let url = Self::stream_url(&params)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let kind = params.kind;
        tokio::spawn(async move {
            read_event_stream(kind, response, tx).await;
        });
        Ok(rx)
    }
}

async fn read_event_stream(
    kind: ChannelKind,
    response: reqwest::Response,
    tx: mpsc::Sender<ChannelEvent>,
) {
    let mut body = response.bytes_stream();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(ChannelEvent::Failure(e.to_string())).await;
                return;
            }
        };
        pending.extend_from_slice(&chunk);
        while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            if let Some(event) = parse_event_line(kind, &line) {
                if tx.send(ChannelEvent::Message(event)).await.is_err() {
                    // Receiver gone: the channel was closed on our side.
                    return;
                }
            }
        }
    }

    // A server-side close is a failure from the channel's point of view:
    // these streams are expected to stay open.
    let _ = tx.send(ChannelEvent::Failure("stream ended".to_string())).await;
}

/// Extract the JSON payload from one line of the stream, if it carries one.
/// Malformed payloads are logged and dropped; the connection stays open.
fn parse_event_line(kind: ChannelKind, line: &[u8]) -> Option<Value> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = match line.split_once(':') {
        Some(("data", rest)) => rest.trim_start(),
        // Other SSE fields (event:, id:, retry:) carry no payload for us.
        Some((field, _)) if matches!(field, "event" | "id" | "retry") => return None,
        _ => line,
    };
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(channel = kind.as_str(), error = %e, "dropping unparseable event line");
            None
        }
    }
}
