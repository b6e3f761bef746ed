#![allow(dead_code)]

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_live_logs::CaptureConfig;

pub const MANDATORY: [&str; 5] = ["severity", "body", "timestamp", "thread_id", "thread_name"];

/// Config with the `tracing` adapter off and a fast writer poll.
pub fn quiet_config(path: impl Into<PathBuf>) -> CaptureConfig {
    CaptureConfig::new(path)
        .capture_framework(false)
        .install_global_subscriber(false)
        .poll_interval(Duration::from_millis(10))
}

/// Parse every line of a JSON-lines file, panicking on malformed lines.
pub fn read_records(path: &Path) -> Vec<Value> {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    assert!(text.is_empty() || text.ends_with('\n'), "last line not terminated");
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap_or_else(|e| panic!("bad line {line:?}: {e}")))
        .collect()
}

pub fn with_body<'a>(records: &'a [Value], body: &str) -> Vec<&'a Value> {
    records.iter().filter(|r| r["body"] == body).collect()
}

pub fn with_source<'a>(records: &'a [Value], source: &str) -> Vec<&'a Value> {
    records.iter().filter(|r| r["source"] == source).collect()
}

pub fn assert_mandatory_fields(record: &Value) {
    for key in MANDATORY {
        assert!(record.get(key).is_some(), "missing {key} in {record}");
    }
    let timestamp = record["timestamp"].as_str().unwrap();
    assert!(
        chrono::DateTime::parse_from_rfc3339(timestamp).is_ok(),
        "bad timestamp {timestamp}"
    );
    assert!(timestamp.ends_with('Z'));
}
