use dashboard_proto::{JsonObject, PartialSnapshot};
use serde_json::Value;

use super::Snapshot;
use super::logbuf;

/// How the `logs` section of a partial arrived.
///
/// Streamed entries are increments and append through the bounded buffer;
/// fetched entries are a server-computed window and replace the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDelivery {
    Streamed,
    Fetched,
}

/// Fold a partial update into `snapshot` in place.
///
/// Every section is optional and independently a no-op when absent; absent
/// never means "clear". Record sections shallow-assign field by field,
/// windowed sections (`time_series`, `history`) replace wholesale.
/// Invariants enforced here:
/// - `status.current_user` is sticky: an update that omits it (or carries
///   null/empty) never clears the signed-in identity.
/// - `config` is left untouched while the user is editing it.
///
/// Total over well-typed partials; applying the same partial twice leaves
/// the same snapshot as applying it once (except log appends, which are
/// increments by contract).
pub fn merge_partial(
    snapshot: &mut Snapshot,
    partial: PartialSnapshot,
    editing_config: bool,
    logs: LogDelivery,
) {
    if let Some(status) = partial.status {
        let prev_user = snapshot.current_user().cloned();
        let incoming_has_user = status.get("current_user").is_some_and(is_present);
        assign_fields(&mut snapshot.status, status);
        if !incoming_has_user {
            if let Some(prev) = prev_user {
                snapshot.status.insert("current_user".to_string(), prev);
            }
        }
    }
    if let Some(stats) = partial.stats {
        assign_fields(&mut snapshot.stats, stats);
    }
    if let Some(config) = partial.config {
        if !editing_config {
            assign_fields(&mut snapshot.config, config);
        }
    }
    if let Some(time_series) = partial.time_series {
        snapshot.time_series = time_series;
    }
    if let Some(history) = partial.history {
        snapshot.history = history;
    }
    if let Some(system) = partial.system {
        assign_fields(&mut snapshot.system, system);
    }
    if let Some(browser_pool) = partial.browser_pool {
        assign_fields(&mut snapshot.browser_pool, browser_pool);
    }
    if let Some(entries) = partial.logs {
        match logs {
            LogDelivery::Streamed => {
                logbuf::append(&mut snapshot.logs, entries, logbuf::LOG_BUFFER_CAP)
            }
            LogDelivery::Fetched => snapshot.logs = entries,
        }
    }
}

/// Shallow last-write-wins assignment of `src` into `dst`.
fn assign_fields(dst: &mut JsonObject, src: JsonObject) {
    for (key, value) in src {
        dst.insert(key, value);
    }
}

/// A value counts as present unless it is null or an empty string; the
/// operator identity must not be clobbered by either.
pub(super) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
