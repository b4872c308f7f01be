//! The synchronization controller: owns the local mirror and every channel
//! that feeds it, and decides what the operator gets told when feeds fail.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use dashboard_proto::{JsonObject, LogStreamEvent, LogsResponse, PartialSnapshot};
use serde_json::Value;

use crate::api::{ApiError, DashboardApi};
use crate::channel::{ChannelConnection, ChannelManager, ChannelState, ConnectOutcome};
use crate::config::Config;
use crate::notify::{DEFAULT_MUTE, ErrorNotifier, Severity, Toast};
use crate::poll::PollingScheduler;
use crate::state::logbuf::{self, LOG_BUFFER_CAP};
use crate::state::merge::{LogDelivery, merge_partial};
use crate::state::Snapshot;
use crate::transport::{ChannelEvent, ChannelKind, PushTransport};

/// Dashboard views the sync core reacts to. Only two of them change its
/// behavior (`Logs` drives the log channel, `Config` arms the merge
/// protection); the rest exist so view state can round-trip settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Overview,
    Logs,
    BrowserPool,
    Cache,
    Config,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Overview => "overview",
            View::Logs => "logs",
            View::BrowserPool => "pool",
            View::Cache => "cache",
            View::Config => "config",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "overview" => Some(View::Overview),
            "logs" => Some(View::Logs),
            "pool" => Some(View::BrowserPool),
            "cache" => Some(View::Cache),
            "config" => Some(View::Config),
            _ => None,
        }
    }
}

/// Where live data currently comes from, as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Streaming,
    Polling,
    Disconnected,
}

impl FeedState {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedState::Streaming => "streaming",
            FeedState::Polling => "polling",
            FeedState::Disconnected => "disconnected",
        }
    }
}

/// User-selected restriction on history/log queries and the log channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScopeFilter {
    #[default]
    All,
    User(String),
}

impl ScopeFilter {
    /// The `user` query parameter this scope translates to.
    pub fn param(&self) -> Option<&str> {
        match self {
            ScopeFilter::All => None,
            ScopeFilter::User(user) => Some(user),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential must not be empty")]
    EmptyCredential,
    #[error("credential rejected: {0}")]
    Rejected(ApiError),
}

#[derive(Debug, Clone)]
struct SessionState {
    api_key: String,
    authenticated: bool,
    auto_refresh: bool,
    active_view: View,
    scope: ScopeFilter,
    feed: FeedState,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            authenticated: false,
            auto_refresh: true,
            active_view: View::Overview,
            scope: ScopeFilter::All,
            feed: FeedState::Disconnected,
        }
    }
}

/// Top-level synchronization controller.
///
/// Owns one [`Snapshot`], both push channels, the polling fallback, and
/// the error notifier; everything external goes through its lifecycle
/// hooks. Cloning shares the same session.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn DashboardApi>,
    config: Config,
    data_channel: ChannelManager,
    log_channel: ChannelManager,
    poller: PollingScheduler,
    snapshot: Mutex<Snapshot>,
    notifier: Mutex<ErrorNotifier>,
    session: Mutex<SessionState>,
}

impl SyncController {
    pub fn new(
        config: Config,
        api: Arc<dyn DashboardApi>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                data_channel: ChannelManager::new(ChannelKind::Data, transport.clone()),
                log_channel: ChannelManager::new(ChannelKind::Logs, transport),
                poller: PollingScheduler::new(),
                snapshot: Mutex::new(Snapshot::default()),
                notifier: Mutex::new(ErrorNotifier::new()),
                session: Mutex::new(SessionState::default()),
                config,
            }),
        }
    }

    /// Validate the credential against the status endpoint, hydrate the
    /// mirror with one full fetch, then bring up the push channels.
    pub async fn start_session(&self, api_key: &str) -> Result<(), SessionError> {
        let inner = &self.inner;
        let key = api_key.trim();
        if key.is_empty() {
            return Err(SessionError::EmptyCredential);
        }

        inner.api.set_credential(key);
        let status = match inner.api.status().await {
            Ok(status) => status,
            Err(e) => {
                inner.api.set_credential("");
                return Err(SessionError::Rejected(e));
            }
        };

        {
            let mut session = inner.session.lock().unwrap();
            session.api_key = key.to_string();
            session.authenticated = true;
        }
        {
            let mut snapshot = inner.snapshot.lock().unwrap();
            let partial = PartialSnapshot {
                status: Some(status),
                ..Default::default()
            };
            merge_partial(&mut snapshot, partial, false, LogDelivery::Fetched);
        }

        // Full hydration before any channel opens, so the first render is
        // never blank.
        inner.refresh().await;
        inner.connect_data_channel().await;
        inner.connect_log_channel().await;
        let auto_refresh = inner.session.lock().unwrap().auto_refresh;
        if auto_refresh && !inner.data_channel.is_streaming() {
            inner.start_polling();
        }
        inner
            .notifier
            .lock()
            .unwrap()
            .announce("signed in", Severity::Success);
        tracing::info!("session started");
        Ok(())
    }

    /// Close channels, stop polling, drop the credential. The mirror's
    /// contents are left for the caller to discard; no further merges are
    /// accepted.
    pub async fn end_session(&self) {
        self.inner.teardown();
        self.inner
            .notifier
            .lock()
            .unwrap()
            .announce("signed out", Severity::Info);
        tracing::info!("session ended");
    }

    /// One externally-triggered fetch-and-merge cycle (the poll tick runs
    /// the same path on its own).
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Explicit request to bring the data channel back up after a failure.
    pub async fn reconnect(&self) {
        self.inner.connect_data_channel().await;
    }

    /// The log channel follows the logs view: entering clears the stale
    /// buffers and connects, leaving closes.
    pub async fn on_view_focus_changed(&self, view: View) {
        let inner = &self.inner;
        {
            inner.session.lock().unwrap().active_view = view;
        }
        if view == View::Logs {
            inner.snapshot.lock().unwrap().clear_logs();
            inner.connect_log_channel().await;
        } else {
            inner.log_channel.close();
        }
    }

    /// Change the user-scope filter: both log views are stale, the log
    /// channel (if focused) reconnects scoped, and history/logs re-fetch.
    pub async fn on_user_scope_filter_changed(&self, scope: ScopeFilter) {
        let inner = &self.inner;
        let logs_focused = {
            let mut session = inner.session.lock().unwrap();
            session.scope = scope;
            session.active_view == View::Logs
        };
        inner.snapshot.lock().unwrap().clear_logs();
        if logs_focused {
            inner.connect_log_channel().await;
        }
        inner.refresh().await;
    }

    pub async fn on_auto_refresh_toggled(&self, enabled: bool) {
        let inner = &self.inner;
        {
            inner.session.lock().unwrap().auto_refresh = enabled;
        }
        if !enabled {
            inner.data_channel.close();
            inner.log_channel.close();
            inner.poller.stop();
            inner.set_feed(FeedState::Disconnected);
            inner
                .notifier
                .lock()
                .unwrap()
                .announce("auto refresh paused", Severity::Info);
            return;
        }
        inner.refresh().await;
        inner.connect_data_channel().await;
        let authenticated = inner.session.lock().unwrap().authenticated;
        if authenticated && !inner.data_channel.is_streaming() {
            inner.start_polling();
        }
        inner
            .notifier
            .lock()
            .unwrap()
            .announce("auto refresh resumed", Severity::Info);
    }

    /// Suppress error toasts for `duration` (default one minute).
    pub fn mute_errors(&self, duration: Option<Duration>) {
        self.inner
            .notifier
            .lock()
            .unwrap()
            .mute(duration.unwrap_or(DEFAULT_MUTE), Instant::now());
    }

    /// The user-edit entry point for configuration fields. Edits land in
    /// the mirror only; [`SyncController::save_config`] pushes them back.
    pub fn update_config_field(&self, key: &str, value: Value) {
        self.inner
            .snapshot
            .lock()
            .unwrap()
            .config
            .insert(key.to_string(), value);
    }

    /// Persist the mirror's config section to the backend.
    pub async fn save_config(&self) -> Result<(), ApiError> {
        let config = self.inner.snapshot.lock().unwrap().config.clone();
        self.inner.api.save_config(&config).await
    }

    /// Drop both log views on user request.
    pub fn clear_logs(&self) {
        self.inner.snapshot.lock().unwrap().clear_logs();
    }

    // --- read surface for the rendering layer ---

    /// A point-in-time copy of the mirror.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.lock().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.lock().unwrap().authenticated
    }

    pub fn feed_state(&self) -> FeedState {
        self.inner.session.lock().unwrap().feed
    }

    pub fn active_view(&self) -> View {
        self.inner.session.lock().unwrap().active_view
    }

    pub fn scope(&self) -> ScopeFilter {
        self.inner.session.lock().unwrap().scope.clone()
    }

    pub fn data_channel_state(&self) -> ChannelState {
        self.inner.data_channel.state()
    }

    pub fn log_channel_state(&self) -> ChannelState {
        self.inner.log_channel.state()
    }

    pub fn toast(&self) -> Option<Toast> {
        self.inner.notifier.lock().unwrap().toast().cloned()
    }

    /// Hand the current toast to the rendering layer and clear it.
    pub fn take_toast(&self) -> Option<Toast> {
        self.inner.notifier.lock().unwrap().take_toast()
    }
}

/// Sections gathered by one full fetch cycle.
struct FetchedState {
    status: JsonObject,
    stats: JsonObject,
    config: JsonObject,
    time_series: Vec<dashboard_proto::TimeSeriesPoint>,
    history: Vec<dashboard_proto::RequestRecord>,
    system: JsonObject,
    browser_pool: JsonObject,
    logs: LogsResponse,
}

impl Inner {
    fn teardown(&self) {
        self.data_channel.close();
        self.log_channel.close();
        self.poller.stop();
        self.api.set_credential("");
        let mut session = self.session.lock().unwrap();
        session.api_key.clear();
        session.authenticated = false;
        session.feed = FeedState::Disconnected;
    }

    fn expire_session(&self) {
        tracing::warn!("backend rejected the session credential");
        self.teardown();
        self.notifier
            .lock()
            .unwrap()
            .announce("session expired", Severity::Error);
    }

    fn set_feed(&self, feed: FeedState) {
        self.session.lock().unwrap().feed = feed;
    }

    /// Throttled error surface; suppressed messages still reach the log.
    fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        let shown = self
            .notifier
            .lock()
            .unwrap()
            .notify_error(message.clone(), Instant::now());
        if shown {
            tracing::warn!(%message, "sync error");
        } else {
            tracing::debug!(%message, "sync error (toast suppressed)");
        }
    }

    /// Fetch every section and fold the result into the mirror. All
    /// sections must arrive; one failure drops the whole cycle so a poll
    /// tick never applies a torn update.
    async fn refresh(&self) {
        let (authenticated, scope) = {
            let session = self.session.lock().unwrap();
            (session.authenticated, session.scope.clone())
        };
        if !authenticated {
            return;
        }
        let user = scope.param();

        let (status, stats, config, time_series, history, system, browser_pool, logs) = tokio::join!(
            self.api.status(),
            self.api.stats(),
            self.api.config(),
            self.api.time_series(),
            self.api.history(user),
            self.api.system(),
            self.api.browser_pool(),
            self.api.logs(self.config.log_fetch_limit, user),
        );

        // Inspect every arm before deciding: an auth rejection anywhere in
        // the cycle must expire the session even when another call failed
        // first for a mundane reason.
        let mut errors = Vec::new();
        let status = keep(status, &mut errors);
        let stats = keep(stats, &mut errors);
        let config = keep(config, &mut errors);
        let time_series = keep(time_series, &mut errors);
        let history = keep(history, &mut errors);
        let system = keep(system, &mut errors);
        let browser_pool = keep(browser_pool, &mut errors);
        let logs = keep(logs, &mut errors);

        if errors.iter().any(ApiError::is_auth_expired) {
            self.expire_session();
            return;
        }
        if let Some(first) = errors.first() {
            self.report_error(format!("refresh failed: {first}"));
            return;
        }

        if let (
            Some(status),
            Some(stats),
            Some(config),
            Some(time_series),
            Some(history),
            Some(system),
            Some(browser_pool),
            Some(logs),
        ) = (status, stats, config, time_series, history, system, browser_pool, logs)
        {
            self.apply_full_fetch(FetchedState {
                status,
                stats,
                config,
                time_series,
                history,
                system,
                browser_pool,
                logs,
            });
        }
    }

    fn apply_full_fetch(&self, update: FetchedState) {
        let editing_config = { self.session.lock().unwrap().active_view == View::Config };
        let partial = PartialSnapshot {
            status: Some(update.status),
            stats: Some(update.stats),
            config: Some(update.config),
            time_series: Some(update.time_series),
            history: Some(update.history),
            system: Some(update.system),
            browser_pool: Some(update.browser_pool),
            logs: Some(update.logs.all),
        };
        let mut snapshot = self.snapshot.lock().unwrap();
        merge_partial(&mut snapshot, partial, editing_config, LogDelivery::Fetched);
        snapshot.user_logs = update.logs.user;
    }

    async fn connect_data_channel(self: &Arc<Self>) {
        let (auto_refresh, authenticated, key) = {
            let session = self.session.lock().unwrap();
            (
                session.auto_refresh,
                session.authenticated,
                session.api_key.clone(),
            )
        };
        if !auto_refresh {
            return;
        }
        match self
            .data_channel
            .connect(&self.config.server_url, &key, authenticated, None)
            .await
        {
            ConnectOutcome::Streaming(conn) => {
                let generation = conn.generation;
                let pump = tokio::spawn(pump_data(Arc::downgrade(self), conn));
                self.data_channel.attach_pump(generation, pump);
                self.poller.stop();
                self.set_feed(FeedState::Streaming);
            }
            ConnectOutcome::Unavailable(reason) => {
                tracing::warn!(%reason, "push transport unavailable, using polling");
                self.start_polling();
            }
            ConnectOutcome::Failed(reason) => {
                tracing::debug!(%reason, "data channel connect failed");
            }
            ConnectOutcome::Skipped => {}
        }
    }

    async fn connect_log_channel(self: &Arc<Self>) {
        let (authenticated, key, active_view, scope) = {
            let session = self.session.lock().unwrap();
            (
                session.authenticated,
                session.api_key.clone(),
                session.active_view,
                session.scope.clone(),
            )
        };
        if active_view != View::Logs {
            return;
        }
        match self
            .log_channel
            .connect(&self.config.server_url, &key, authenticated, scope.param())
            .await
        {
            ConnectOutcome::Streaming(conn) => {
                let generation = conn.generation;
                let pump = tokio::spawn(pump_logs(Arc::downgrade(self), conn));
                self.log_channel.attach_pump(generation, pump);
            }
            ConnectOutcome::Unavailable(reason) => {
                tracing::warn!(%reason, "push transport unavailable, log view will rely on fetches");
            }
            ConnectOutcome::Failed(_) => {
                self.report_error("log stream unavailable");
                let inner = self.clone();
                tokio::spawn(async move { inner.refresh().await });
            }
            ConnectOutcome::Skipped => {}
        }
    }

    fn start_polling(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.poller.start(self.config.poll_interval, move || {
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(async move { inner.refresh().await });
            }
        });
        self.set_feed(FeedState::Polling);
    }

    fn apply_stream_payload(&self, payload: Value) {
        let partial: PartialSnapshot = match serde_json::from_value(payload) {
            Ok(partial) => partial,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed data event");
                return;
            }
        };
        let editing_config = { self.session.lock().unwrap().active_view == View::Config };
        let mut snapshot = self.snapshot.lock().unwrap();
        merge_partial(&mut snapshot, partial, editing_config, LogDelivery::Streamed);
    }

    fn apply_log_event(&self, payload: Value) {
        let event: LogStreamEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed log event");
                return;
            }
        };
        let mut snapshot = self.snapshot.lock().unwrap();
        if let Some(all) = event.all {
            logbuf::append(&mut snapshot.logs, all, LOG_BUFFER_CAP);
        }
        if let Some(user) = event.user {
            logbuf::append(&mut snapshot.user_logs, user, LOG_BUFFER_CAP);
        }
    }

    /// The data feed died: one transition to polling, one unthrottled
    /// notice. Late failures from replaced connections are discarded by
    /// the generation check.
    fn on_data_channel_failure(self: &Arc<Self>, generation: u64, reason: &str) {
        if !self.data_channel.mark_disconnected(generation) {
            return;
        }
        tracing::warn!(%reason, "data stream lost, falling back to polling");
        self.start_polling();
        self.notifier
            .lock()
            .unwrap()
            .announce("live stream lost, falling back to polling", Severity::Error);
    }

    /// The log channel has no polling fallback: notify (throttled) and
    /// re-fetch once so the log view does not sit on stale entries.
    fn on_log_channel_failure(self: &Arc<Self>, generation: u64, reason: &str) {
        if !self.log_channel.mark_disconnected(generation) {
            return;
        }
        tracing::warn!(%reason, "log stream lost");
        self.report_error("log stream disconnected");
        let inner = self.clone();
        tokio::spawn(async move { inner.refresh().await });
    }
}

fn keep<T>(result: Result<T, ApiError>, errors: &mut Vec<ApiError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

async fn pump_data(inner: Weak<Inner>, mut conn: ChannelConnection) {
    while let Some(event) = conn.events.recv().await {
        if conn.is_closed() {
            break;
        }
        let Some(inner) = inner.upgrade() else { break };
        match event {
            ChannelEvent::Message(payload) => inner.apply_stream_payload(payload),
            ChannelEvent::Failure(reason) => {
                inner.on_data_channel_failure(conn.generation, &reason);
                break;
            }
        }
    }
}

async fn pump_logs(inner: Weak<Inner>, mut conn: ChannelConnection) {
    while let Some(event) = conn.events.recv().await {
        if conn.is_closed() {
            break;
        }
        let Some(inner) = inner.upgrade() else { break };
        match event {
            ChannelEvent::Message(payload) => inner.apply_log_event(payload),
            ChannelEvent::Failure(reason) => {
                inner.on_log_channel_failure(conn.generation, &reason);
                break;
            }
        }
    }
}
