use dashboard_proto::LogEntry;

/// Upper bound on retained log entries per view. The log channel is
/// long-lived and unbounded; without the cap a session left open grows
/// without limit.
pub const LOG_BUFFER_CAP: usize = 400;

/// Append `incoming` to `buffer`, evicting from the front until the buffer
/// holds at most `cap` entries. Relative order of retained entries is
/// preserved; eviction is strictly oldest-first.
pub fn append(buffer: &mut Vec<LogEntry>, incoming: Vec<LogEntry>, cap: usize) {
    buffer.extend(incoming);
    if buffer.len() > cap {
        let overflow = buffer.len() - cap;
        buffer.drain(..overflow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry {
            timestamp: format!("10:00:{:02}", n % 60),
            level: "info".to_string(),
            message: format!("line {n}"),
            user: None,
        }
    }

    #[test]
    fn append_below_cap_keeps_everything() {
        let mut buffer = Vec::new();
        append(&mut buffer, (0..10).map(entry).collect(), LOG_BUFFER_CAP);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer[0].message, "line 0");
    }

    #[test]
    fn append_evicts_oldest_first() {
        let mut buffer: Vec<LogEntry> = (0..390).map(entry).collect();
        append(&mut buffer, (390..420).map(entry).collect(), LOG_BUFFER_CAP);
        assert_eq!(buffer.len(), LOG_BUFFER_CAP);
        // The retained suffix is the last 400 logically-appended entries.
        assert_eq!(buffer[0].message, "line 20");
        assert_eq!(buffer[399].message, "line 419");
    }

    #[test]
    fn single_oversized_batch_is_trimmed_to_cap() {
        let mut buffer = Vec::new();
        append(&mut buffer, (0..1000).map(entry).collect(), LOG_BUFFER_CAP);
        assert_eq!(buffer.len(), LOG_BUFFER_CAP);
        assert_eq!(buffer[0].message, "line 600");
        assert_eq!(buffer[399].message, "line 999");
    }

    #[test]
    fn bound_holds_across_arbitrary_append_sequences() {
        let mut buffer = Vec::new();
        let mut next = 0usize;
        for batch in [3usize, 150, 1, 380, 42, 500, 7] {
            append(&mut buffer, (next..next + batch).map(entry).collect(), LOG_BUFFER_CAP);
            next += batch;
            assert!(buffer.len() <= LOG_BUFFER_CAP);
            // Order preserved within what survived.
            let expected_start = next.saturating_sub(buffer.len());
            assert_eq!(buffer[0].message, format!("line {expected_start}"));
            assert_eq!(buffer.last().unwrap().message, format!("line {}", next - 1));
        }
    }
}
