pub mod logbuf;
pub mod merge;

use dashboard_proto::{JsonObject, LogEntry, RequestRecord, TimeSeriesPoint};
use serde_json::Value;

/// The authoritative local mirror of the backend's operational state.
///
/// Created empty at session start, mutated for the session's duration
/// (only ever through [`merge::merge_partial`] and [`logbuf::append`]),
/// discarded on logout. Sections the backend has not reported yet are
/// simply empty.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub status: JsonObject,
    pub stats: JsonObject,
    pub config: JsonObject,
    pub time_series: Vec<TimeSeriesPoint>,
    pub history: Vec<RequestRecord>,
    pub system: JsonObject,
    pub browser_pool: JsonObject,
    /// Unscoped log view.
    pub logs: Vec<LogEntry>,
    /// Log view restricted to the active scope filter.
    pub user_logs: Vec<LogEntry>,
}

impl Snapshot {
    /// The signed-in operator identity as last reported by the backend.
    pub fn current_user(&self) -> Option<&Value> {
        self.status.get("current_user").filter(|v| merge::is_present(v))
    }

    /// Drop both log views (scope filter changed, entries are stale).
    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.user_logs.clear();
    }
}
