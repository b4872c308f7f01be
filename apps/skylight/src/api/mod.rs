use async_trait::async_trait;
use dashboard_proto::{JsonObject, LogsResponse, RequestRecord, TimeSeriesPoint};
use serde_json::Value;
use thiserror::Error;

pub mod http;

pub use http::HttpApi;

/// Failures surfaced by the REST collaborator, pre-sorted into the classes
/// the controller cares about: only `Unauthorized` ends the session, only
/// `Timeout` names itself as such to the user, everything else is a
/// transient network-shaped failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for the 401-class responses that invalidate the session.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// The dashboard REST surface the synchronization core consumes.
///
/// A trait so the controller can run against an in-memory double in tests;
/// the production implementation is [`HttpApi`].
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Install the credential used by subsequent calls. An empty string
    /// clears it.
    fn set_credential(&self, key: &str);

    async fn status(&self) -> Result<JsonObject, ApiError>;
    async fn stats(&self) -> Result<JsonObject, ApiError>;
    async fn config(&self) -> Result<JsonObject, ApiError>;
    async fn time_series(&self) -> Result<Vec<TimeSeriesPoint>, ApiError>;
    async fn history(&self, user: Option<&str>) -> Result<Vec<RequestRecord>, ApiError>;
    async fn system(&self) -> Result<JsonObject, ApiError>;
    async fn browser_pool(&self) -> Result<JsonObject, ApiError>;
    async fn logs(&self, limit: usize, user: Option<&str>) -> Result<LogsResponse, ApiError>;

    /// Persist edited configuration back to the backend.
    async fn save_config(&self, config: &JsonObject) -> Result<(), ApiError>;
    async fn restart_browser_pool(&self) -> Result<(), ApiError>;
    async fn clear_cache(&self) -> Result<(), ApiError>;
    /// One-shot bypass test; slow by nature, so it runs on the long
    /// timeout.
    async fn run_bypass_test(&self, url: &str, params: &JsonObject) -> Result<Value, ApiError>;
}
