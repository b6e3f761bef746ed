use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::thread::Thread;

/// Free-form, ordered field mapping submitted by producers.
pub type Fields = BTreeMap<String, Value>;

pub const SEVERITY: &str = "severity";
pub const BODY: &str = "body";
pub const TIMESTAMP: &str = "timestamp";
pub const THREAD_ID: &str = "thread_id";
pub const THREAD_NAME: &str = "thread_name";

pub const SOURCE: &str = "source";
pub const STREAM_NAME: &str = "stream_name";
pub const LOGGER_NAME: &str = "logger_name";
pub const MODULE: &str = "module";
pub const FUNCTION: &str = "function";
pub const LINE: &str = "line";
pub const FILE: &str = "file";
pub const EXCEPTION: &str = "exception";

const UNNAMED_THREAD: &str = "<unnamed>";

/// Severity of a [`LogRecord`], serialized in upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parse a severity name the way most logging frameworks spell it.
    ///
    /// Matching is case-insensitive; `WARNING` maps to `Warn` and
    /// `CRITICAL`/`FATAL` map to `Error`. Anything unrecognised is `Info`.
    pub fn parse_lenient(text: &str) -> Severity {
        match text.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Severity::Trace,
            "DEBUG" => Severity::Debug,
            "WARN" | "WARNING" => Severity::Warn,
            "ERROR" | "CRITICAL" | "FATAL" => Severity::Error,
            _ => Severity::Info,
        }
    }

    fn from_value(value: &Value) -> Severity {
        match value {
            Value::String(text) => Severity::parse_lenient(text),
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            Severity::Error
        } else if level == tracing::Level::WARN {
            Severity::Warn
        } else if level == tracing::Level::INFO {
            Severity::Info
        } else if level == tracing::Level::DEBUG {
            Severity::Debug
        } else {
            Severity::Trace
        }
    }
}

impl From<Severity> for Value {
    fn from(severity: Severity) -> Self {
        Value::String(severity.as_str().to_string())
    }
}

/// A normalized structured log record.
///
/// The mandatory fields are typed; every other field lives in an ordered
/// map whose values are JSON scalars. Records are immutable once built by
/// [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    severity: Severity,
    body: String,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
    thread_id: String,
    thread_name: String,
    #[serde(flatten)]
    fields: Fields,
}

impl LogRecord {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Optional and caller-supplied fields, excluding the mandatory ones.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

fn serialize_timestamp<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Build a [`LogRecord`] from a free-form field mapping.
///
/// `severity` and `body` are lifted out of the mapping. `timestamp`,
/// `thread_id` and `thread_name` are always stamped from the calling
/// context, whatever the caller put under those keys. Arrays and objects
/// are coerced to their JSON text so every remaining value is a scalar.
pub fn normalize(fields: Fields) -> LogRecord {
    normalize_with(fields, Utc::now(), &std::thread::current())
}

pub(crate) fn normalize_with(mut fields: Fields, now: DateTime<Utc>, thread: &Thread) -> LogRecord {
    let severity = fields
        .remove(SEVERITY)
        .map(|value| Severity::from_value(&value))
        .unwrap_or(Severity::Info);

    let body = match fields.remove(BODY) {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    fields.remove(TIMESTAMP);
    fields.remove(THREAD_ID);
    fields.remove(THREAD_NAME);

    for value in fields.values_mut() {
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            *value = Value::String(value.to_string());
        }
    }

    LogRecord {
        severity,
        body,
        timestamp: now,
        thread_id: format!("{:?}", thread.id()),
        thread_name: thread.name().unwrap_or(UNNAMED_THREAD).to_string(),
        fields,
    }
}

/// Build a [`Fields`] map from `key => value` pairs.
///
/// Values go through `serde_json::Value::from`, so strings, integers,
/// floats and booleans can be used directly.
#[macro_export]
macro_rules! fields {
    () => {
        $crate::record::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::record::Fields::new();
        $(
            fields.insert(
                ::std::string::String::from($key),
                $crate::__private::serde_json::Value::from($value),
            );
        )+
        fields
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn stamps_thread_identity_over_caller_values() {
        let record = std::thread::Builder::new()
            .name("worker-7".to_string())
            .spawn(|| {
                normalize(crate::fields! {
                    "body" => "hello",
                    "thread_name" => "spoofed",
                    "thread_id" => "spoofed",
                    "timestamp" => "1970-01-01T00:00:00Z",
                })
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(record.thread_name(), "worker-7");
        assert_ne!(record.thread_id(), "spoofed");
        assert!(record.timestamp().timestamp() > 0);
        assert!(record.fields().is_empty());
    }

    #[test]
    fn severity_and_body_are_lifted_out_of_fields() {
        let record = normalize(crate::fields! {
            "severity" => "warning",
            "body" => "disk almost full",
            "logger_name" => "storage",
        });

        assert_eq!(record.severity(), Severity::Warn);
        assert_eq!(record.body(), "disk almost full");
        assert_eq!(record.get(LOGGER_NAME), Some(&json!("storage")));
        assert!(record.get(SEVERITY).is_none());
        assert!(record.get(BODY).is_none());
    }

    #[test]
    fn missing_or_unknown_values_fall_back() {
        let record = normalize(crate::fields! { "severity" => "loud" });
        assert_eq!(record.severity(), Severity::Info);
        assert_eq!(record.body(), "");

        let record = normalize(crate::fields! { "severity" => 3, "body" => 42 });
        assert_eq!(record.severity(), Severity::Info);
        assert_eq!(record.body(), "42");
    }

    #[test]
    fn parses_framework_spellings() {
        assert_eq!(Severity::parse_lenient("CRITICAL"), Severity::Error);
        assert_eq!(Severity::parse_lenient("fatal"), Severity::Error);
        assert_eq!(Severity::parse_lenient(" Debug "), Severity::Debug);
        assert_eq!(Severity::parse_lenient("trace"), Severity::Trace);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::Warn);
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Trace);
    }

    #[test]
    fn nested_values_are_coerced_to_text() {
        let mut fields = Fields::new();
        fields.insert("tags".to_string(), json!(["a", "b"]));
        fields.insert("ctx".to_string(), json!({"k": 1}));
        fields.insert("ok".to_string(), json!(true));
        fields.insert("missing".to_string(), Value::Null);

        let record = normalize(fields);

        assert_eq!(record.get("tags"), Some(&json!("[\"a\",\"b\"]")));
        assert_eq!(record.get("ctx"), Some(&json!("{\"k\":1}")));
        assert_eq!(record.get("ok"), Some(&json!(true)));
        assert_eq!(record.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn serializes_mandatory_fields_first() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:30:45.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let thread = std::thread::current();
        let record = normalize_with(
            crate::fields! { "body" => "x", "zeta" => 1, "alpha" => "a" },
            now,
            &thread,
        );

        let line = serde_json::to_string(&record).unwrap();
        let expected_prefix = "{\"severity\":\"INFO\",\"body\":\"x\",\"timestamp\":\"2024-05-01T12:30:45.123456Z\",\"thread_id\":";
        assert!(line.starts_with(expected_prefix), "{line}");
        assert!(line.ends_with(",\"alpha\":\"a\",\"zeta\":1}"), "{line}");
    }
}
