use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;
pub mod sse;

/// The two logical push channels the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Aggregated dashboard state (`/api/dashboard/stream`).
    Data,
    /// Live log lines (`/api/dashboard/logs/stream`).
    Logs,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Data => "data",
            ChannelKind::Logs => "logs",
        }
    }
}

/// Parameters for opening a push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub kind: ChannelKind,
    pub base_url: String,
    /// Opaque credential, passed through as the `key` query parameter.
    pub key: String,
    /// Scope filter for the log channel (`user` query parameter).
    pub user: Option<String>,
}

/// One inbound event from a push channel. A channel delivers any number of
/// `Message`s followed by at most one `Failure`; after a `Failure` (or the
/// receiver closing) the connection is dead.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(Value),
    Failure(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Push transport cannot be used at all in this environment; the
    /// caller should fall back to polling without retrying.
    #[error("push transport unavailable: {0}")]
    Unavailable(String),
    /// This connection attempt failed (network refused, bad URL, non-2xx).
    #[error("failed to open channel: {0}")]
    Connect(String),
}

/// Abstraction over the server-push mechanism.
///
/// `connect` resolving `Ok` is the server-confirmed open; events then
/// arrive on the returned receiver until failure or close. Dropping the
/// receiver tears the connection down.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(
        &self,
        params: StreamParams,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError>;
}
