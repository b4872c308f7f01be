use async_trait::async_trait;
use dashboard_proto::{JsonObject, LogsResponse, RequestRecord, TimeSeriesPoint};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

use super::{ApiError, DashboardApi};

/// Ordinary calls must come back quickly; the mirror survives on
/// last-known-good data if they don't.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Bypass tests drive a real browser on the backend and routinely take
/// tens of seconds.
const TEST_TIMEOUT: Duration = Duration::from_secs(60);

const API_KEY_HEADER: &str = "X-API-KEY";

/// `DashboardApi` over HTTP.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    api_key: RwLock<String>,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: RwLock::new(String::new()),
        })
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}/api/dashboard{}", self.base_url, path))
            .map_err(|e| ApiError::Network(format!("bad request url: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let url = self.build_url(path, query)?;
        let key = self.api_key.read().unwrap().clone();
        let mut request = self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, key)
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else if e.is_decode() {
                    ApiError::Decode(e.to_string())
                } else {
                    ApiError::Network(e.to_string())
                }
            })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, query, None, REQUEST_TIMEOUT)
            .await
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    fn set_credential(&self, key: &str) {
        *self.api_key.write().unwrap() = key.to_string();
    }

    async fn status(&self) -> Result<JsonObject, ApiError> {
        self.get("/status", &[]).await
    }

    async fn stats(&self) -> Result<JsonObject, ApiError> {
        self.get("/stats", &[]).await
    }

    async fn config(&self) -> Result<JsonObject, ApiError> {
        self.get("/config", &[]).await
    }

    async fn time_series(&self) -> Result<Vec<TimeSeriesPoint>, ApiError> {
        self.get("/time-series", &[]).await
    }

    async fn history(&self, user: Option<&str>) -> Result<Vec<RequestRecord>, ApiError> {
        match user {
            Some(user) => self.get("/history", &[("user", user)]).await,
            None => self.get("/history", &[]).await,
        }
    }

    async fn system(&self) -> Result<JsonObject, ApiError> {
        self.get("/system", &[]).await
    }

    async fn browser_pool(&self) -> Result<JsonObject, ApiError> {
        self.get("/browser-pool", &[]).await
    }

    async fn logs(&self, limit: usize, user: Option<&str>) -> Result<LogsResponse, ApiError> {
        let limit = limit.to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", limit.as_str())];
        if let Some(user) = user {
            query.push(("user", user));
        }
        self.get("/logs", &query).await
    }

    async fn save_config(&self, config: &JsonObject) -> Result<(), ApiError> {
        let body = Value::Object(config.clone());
        self.request::<Value>(Method::PUT, "/config", &[], Some(&body), REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn restart_browser_pool(&self) -> Result<(), ApiError> {
        self.request::<Value>(
            Method::POST,
            "/browser-pool/restart",
            &[],
            None,
            REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), ApiError> {
        self.request::<Value>(Method::POST, "/cache/clear", &[], None, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn run_bypass_test(&self, url: &str, params: &JsonObject) -> Result<Value, ApiError> {
        let mut body = params.clone();
        body.insert("url".to_string(), Value::String(url.to_string()));
        self.request(
            Method::POST,
            "/test",
            &[],
            Some(&Value::Object(body)),
            TEST_TIMEOUT,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_encodes_query() {
        let api = HttpApi::new("http://127.0.0.1:8000/").unwrap();
        let url = api
            .build_url("/logs", &[("limit", "200"), ("user", "night shift")])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/api/dashboard/logs?limit=200&user=night+shift");
    }

    #[test]
    fn unauthorized_is_the_session_ending_class() {
        assert!(ApiError::Unauthorized.is_auth_expired());
        assert!(!ApiError::Timeout.is_auth_expired());
        assert!(
            !ApiError::Http {
                status: 500,
                body: String::new()
            }
            .is_auth_expired()
        );
    }
}
