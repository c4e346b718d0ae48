use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A single timestamped, labeled log line handed from the fetch layer to a
/// [`LogSink`](crate::sink::LogSink).
///
/// `labels` identify the stream on the backend and should never be empty;
/// this is not enforced here. `structured_metadata` travels alongside the
/// line without becoming part of the stream identity; an empty map means
/// "no metadata".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    pub line: String,
    pub structured_metadata: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        labels: BTreeMap<String, String>,
        line: impl Into<String>,
    ) -> Self {
        LogEntry {
            timestamp,
            labels,
            line: line.into(),
            structured_metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.structured_metadata.insert(key.into(), value.into());
        self
    }

    /// Nanoseconds since the Unix epoch.
    ///
    /// Widened to `i128` so that no representable timestamp overflows.
    pub fn unix_nanos(&self) -> i128 {
        i128::from(self.timestamp.timestamp()) * 1_000_000_000
            + i128::from(self.timestamp.timestamp_subsec_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("service".to_string(), "test".to_string()),
            ("env".to_string(), "dev".to_string()),
        ])
    }

    #[test]
    fn new_entry_has_no_metadata() {
        let now = Utc::now();
        let entry = LogEntry::new(now, labels(), r#"{"test": "data"}"#);

        assert_eq!(entry.timestamp, now);
        assert_eq!(entry.labels["service"], "test");
        assert_eq!(entry.labels["env"], "dev");
        assert_eq!(entry.line, r#"{"test": "data"}"#);
        assert!(entry.structured_metadata.is_empty());
    }

    #[test]
    fn with_metadata_accumulates() {
        let entry = LogEntry::new(Utc::now(), labels(), "x")
            .with_metadata("hex", "abc123")
            .with_metadata("flight", "BAW1");

        assert_eq!(entry.structured_metadata.len(), 2);
        assert_eq!(entry.structured_metadata["hex"], "abc123");
    }

    #[test]
    fn unix_nanos_keeps_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let entry = LogEntry::new(ts, labels(), "x");

        assert_eq!(entry.unix_nanos(), 1_700_000_000_123_456_789);
    }

    #[test]
    fn unix_nanos_before_epoch_is_negative() {
        let ts = Utc.timestamp_opt(-1, 500_000_000).unwrap();
        let entry = LogEntry::new(ts, labels(), "x");

        assert_eq!(entry.unix_nanos(), -500_000_000);
    }
}
