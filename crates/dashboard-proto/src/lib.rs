//! Wire types for the gateway dashboard API and its push channels.
//! Kept in a dedicated crate so the client core, tests, and any future
//! bindings agree on one set of shapes without pulling in runtime code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An open JSON record section (`status`, `stats`, `config`, `system`,
/// `browser_pool`). The backend evolves these shapes independently of the
/// client, so they stay schemaless and are merged field-by-field.
pub type JsonObject = serde_json::Map<String, Value>;

/// One per-minute rollup row of the request time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time: String,
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub avg_time: f64,
}

/// One row of the request history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(default)]
    pub id: u64,
    pub url: String,
    pub success: bool,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub timestamp: String,
}

/// A single log line as the backend parses it out of its log file.
/// `level` stays a plain lowercase string ("info", "warning", ...) rather
/// than an enum: unknown levels must still display, not fail decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default = "default_level")]
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

/// One event on the data push channel, and equally the payload of a full
/// poll cycle. Every section is optional; an absent section means
/// "no change", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<TimeSeriesPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<RequestRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_pool: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
}

impl PartialSnapshot {
    /// True when the event carried no recognizable section at all.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.stats.is_none()
            && self.config.is_none()
            && self.time_series.is_none()
            && self.history.is_none()
            && self.system.is_none()
            && self.browser_pool.is_none()
            && self.logs.is_none()
    }
}

/// One event on the log push channel. `all` carries unscoped lines,
/// `user` the lines matching the requested scope filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStreamEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<LogEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Vec<LogEntry>>,
}

/// The response of `GET /api/dashboard/logs`: both views in one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub all: Vec<LogEntry>,
    #[serde(default)]
    pub user: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_snapshot_tolerates_subset_of_sections() {
        let partial: PartialSnapshot =
            serde_json::from_str(r#"{"stats": {"total": 3}, "logs": []}"#).unwrap();
        assert!(partial.status.is_none());
        assert_eq!(
            partial.stats.as_ref().unwrap().get("total"),
            Some(&serde_json::json!(3))
        );
        assert_eq!(partial.logs.as_deref(), Some(&[][..]));
        assert!(!partial.is_empty());
        assert!(PartialSnapshot::default().is_empty());
    }

    #[test]
    fn log_entry_defaults_missing_fields() {
        let entry: LogEntry = serde_json::from_str(r#"{"message": "pool warmed"}"#).unwrap();
        assert_eq!(entry.level, "info");
        assert_eq!(entry.timestamp, "");
        assert!(entry.user.is_none());
    }

    #[test]
    fn request_record_round_trips_unscoped_user() {
        let row: RequestRecord = serde_json::from_str(
            r#"{"url": "https://example.com", "success": true, "timestamp": "2026-01-05 10:00:00"}"#,
        )
        .unwrap();
        assert!(row.user.is_none());
        let back = serde_json::to_value(&row).unwrap();
        assert!(back.get("user").is_none());
    }
}
