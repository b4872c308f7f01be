use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transport::{ChannelEvent, ChannelKind, PushTransport, StreamParams, TransportError};

/// State of one logical push channel. `Polling` is not a channel state:
/// the pull fallback belongs to the controller, a disconnected channel is
/// just disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Streaming,
    Disconnected,
}

/// What a connect attempt did.
pub enum ConnectOutcome {
    /// Precondition failed (no credential / not authenticated): no-op.
    Skipped,
    /// The push mechanism is unusable; the caller should fall back
    /// immediately without treating this as a channel error.
    Unavailable(String),
    /// Server-confirmed open; pump the returned connection.
    Streaming(ChannelConnection),
    /// The attempt itself failed (refused, bad URL, non-2xx).
    Failed(String),
}

/// A live connection as handed to the caller's event pump.
pub struct ChannelConnection {
    pub events: mpsc::Receiver<ChannelEvent>,
    pub generation: u64,
    closed: Arc<AtomicBool>,
}

impl ChannelConnection {
    /// True once the owning manager closed or replaced this connection;
    /// any event still in flight must be discarded.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct ActiveConnection {
    generation: u64,
    closed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl ActiveConnection {
    fn shut_down(mut self) {
        self.closed.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Owns at most one live push connection for one logical channel and runs
/// its `{Idle, Streaming, Disconnected}` state machine. Reconnection is
/// always an explicit caller decision; the manager never retries on its
/// own timer.
pub struct ChannelManager {
    kind: ChannelKind,
    transport: Arc<dyn PushTransport>,
    inner: Mutex<ManagerInner>,
}

struct ManagerInner {
    state: ChannelState,
    generation: u64,
    active: Option<ActiveConnection>,
}

impl ChannelManager {
    pub fn new(kind: ChannelKind, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            kind,
            transport,
            inner: Mutex::new(ManagerInner {
                state: ChannelState::Idle,
                generation: 0,
                active: None,
            }),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().unwrap().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == ChannelState::Streaming
    }

    /// Open the channel. Any previous connection is torn down first, so at
    /// most one is ever live. Requires a non-empty credential and an
    /// authenticated session, otherwise this is a no-op.
    pub async fn connect(
        &self,
        base_url: &str,
        key: &str,
        authenticated: bool,
        user: Option<&str>,
    ) -> ConnectOutcome {
        if key.is_empty() || !authenticated {
            return ConnectOutcome::Skipped;
        }

        // Tear down the previous connection before dialing, outside the
        // transport await.
        let previous = self.inner.lock().unwrap().active.take();
        if let Some(previous) = previous {
            previous.shut_down();
        }

        let params = StreamParams {
            kind: self.kind,
            base_url: base_url.to_string(),
            key: key.to_string(),
            user: user.map(str::to_string),
        };
        match self.transport.connect(params).await {
            Ok(events) => {
                let closed = Arc::new(AtomicBool::new(false));
                let mut inner = self.inner.lock().unwrap();
                inner.generation += 1;
                inner.state = ChannelState::Streaming;
                inner.active = Some(ActiveConnection {
                    generation: inner.generation,
                    closed: closed.clone(),
                    pump: None,
                });
                tracing::debug!(channel = self.kind.as_str(), generation = inner.generation, "channel open");
                ConnectOutcome::Streaming(ChannelConnection {
                    events,
                    generation: inner.generation,
                    closed,
                })
            }
            Err(TransportError::Unavailable(reason)) => {
                self.inner.lock().unwrap().state = ChannelState::Disconnected;
                ConnectOutcome::Unavailable(reason)
            }
            Err(TransportError::Connect(reason)) => {
                self.inner.lock().unwrap().state = ChannelState::Disconnected;
                tracing::debug!(channel = self.kind.as_str(), %reason, "channel connect failed");
                ConnectOutcome::Failed(reason)
            }
        }
    }

    /// Register the task pumping a connection's events so `close` can
    /// abort it.
    pub fn attach_pump(&self, generation: u64, pump: JoinHandle<()>) {
        let mut inner = self.inner.lock().unwrap();
        match inner.active.as_mut() {
            Some(active) if active.generation == generation => active.pump = Some(pump),
            // The connection was already replaced or closed.
            _ => pump.abort(),
        }
    }

    /// Record an asynchronous failure of connection `generation`. Returns
    /// true only for the first failure of the currently-live connection;
    /// stale generations (a newer connection exists, or the channel was
    /// closed meanwhile) report false and must cause no side effects.
    pub fn mark_disconnected(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let current = match inner.active.as_ref() {
            Some(active) if active.generation == generation => true,
            _ => false,
        };
        if !current || inner.state != ChannelState::Streaming {
            return false;
        }
        inner.state = ChannelState::Disconnected;
        if let Some(active) = inner.active.take() {
            active.shut_down();
        }
        tracing::debug!(channel = self.kind.as_str(), generation, "channel lost");
        true
    }

    /// Tear down from any state, including already-idle.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = ChannelState::Idle;
        if let Some(active) = inner.active.take() {
            active.shut_down();
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn manager(transport: &MockTransport) -> ChannelManager {
        ChannelManager::new(ChannelKind::Data, Arc::new(transport.clone()))
    }

    #[tokio::test]
    async fn connect_requires_credentials_and_auth() {
        let transport = MockTransport::new();
        let channels = manager(&transport);

        assert!(matches!(
            channels.connect("http://base", "", true, None).await,
            ConnectOutcome::Skipped
        ));
        assert!(matches!(
            channels.connect("http://base", "key", false, None).await,
            ConnectOutcome::Skipped
        ));
        assert_eq!(transport.connect_count(ChannelKind::Data), 0);
        assert_eq!(channels.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn connect_reaches_streaming_and_close_is_safe_from_any_state() {
        let transport = MockTransport::new();
        let channels = manager(&transport);

        channels.close(); // already idle: no-op

        let outcome = channels.connect("http://base", "key", true, None).await;
        assert!(matches!(outcome, ConnectOutcome::Streaming(_)));
        assert_eq!(channels.state(), ChannelState::Streaming);

        channels.close();
        assert_eq!(channels.state(), ChannelState::Idle);
        channels.close();
        assert_eq!(channels.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn stale_generation_failures_are_ignored() {
        let transport = MockTransport::new();
        let channels = manager(&transport);

        let first = match channels.connect("http://base", "key", true, None).await {
            ConnectOutcome::Streaming(conn) => conn,
            _ => panic!("expected streaming"),
        };
        let second = match channels.connect("http://base", "key", true, None).await {
            ConnectOutcome::Streaming(conn) => conn,
            _ => panic!("expected streaming"),
        };

        // The replaced connection is flagged closed and its late failure
        // does not disturb the live one.
        assert!(first.is_closed());
        assert!(!channels.mark_disconnected(first.generation));
        assert_eq!(channels.state(), ChannelState::Streaming);

        assert!(channels.mark_disconnected(second.generation));
        assert_eq!(channels.state(), ChannelState::Disconnected);
        // Only the first failure of a generation counts.
        assert!(!channels.mark_disconnected(second.generation));
    }

    #[tokio::test]
    async fn unavailable_transport_reports_fallback_not_failure() {
        let transport = MockTransport::new();
        transport.set_unavailable(true);
        let channels = manager(&transport);

        match channels.connect("http://base", "key", true, None).await {
            ConnectOutcome::Unavailable(_) => {}
            _ => panic!("expected unavailable"),
        }
        assert_eq!(channels.state(), ChannelState::Disconnected);
    }
}
