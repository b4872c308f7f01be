use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{ChannelEvent, ChannelKind, PushTransport, StreamParams, TransportError};

/// Scriptable in-memory transport for tests: connects always "open"
/// unless told otherwise, and the test injects events by hand.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Default)]
struct MockInner {
    connects: Vec<StreamParams>,
    refusals: VecDeque<TransportError>,
    unavailable: bool,
    live: HashMap<ChannelKind, mpsc::Sender<ChannelEvent>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` fail with the given error.
    pub fn refuse_next(&self, error: TransportError) {
        self.inner.lock().unwrap().refusals.push_back(error);
    }

    /// Simulate a runtime with no push mechanism at all.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    pub fn connect_count(&self, kind: ChannelKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .connects
            .iter()
            .filter(|p| p.kind == kind)
            .count()
    }

    pub fn last_params(&self, kind: ChannelKind) -> Option<StreamParams> {
        self.inner
            .lock()
            .unwrap()
            .connects
            .iter()
            .rev()
            .find(|p| p.kind == kind)
            .cloned()
    }

    /// Deliver an event on the most recent live connection of `kind`.
    /// Returns false if there is none (or it is gone).
    pub async fn emit(&self, kind: ChannelKind, event: ChannelEvent) -> bool {
        let sender = self.inner.lock().unwrap().live.get(&kind).cloned();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Deliver a JSON message on the most recent live connection of `kind`.
    pub async fn emit_message(&self, kind: ChannelKind, payload: serde_json::Value) -> bool {
        self.emit(kind, ChannelEvent::Message(payload)).await
    }

    /// Fail the most recent live connection of `kind`.
    pub async fn emit_failure(&self, kind: ChannelKind, reason: &str) -> bool {
        self.emit(kind, ChannelEvent::Failure(reason.to_string())).await
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(
        &self,
        params: StreamParams,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connects.push(params.clone());
        if inner.unavailable {
            return Err(TransportError::Unavailable("mock transport disabled".to_string()));
        }
        if let Some(error) = inner.refusals.pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(32);
        inner.live.insert(params.kind, tx);
        Ok(rx)
    }
}
