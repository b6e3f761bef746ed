use crate::record::{self, Fields, Severity};
use crate::session::Session;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Sessions currently receiving `tracing` events.
static REGISTRY: Lazy<RwLock<Vec<Arc<Session>>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Route events seen by any [`CaptureLayer`] to `session`.
///
/// Registering the same session twice is a no-op.
pub(crate) fn register(session: &Arc<Session>) {
    let mut sessions = REGISTRY.write();
    if !sessions.iter().any(|s| s.id() == session.id()) {
        sessions.push(Arc::clone(session));
    }
}

/// Stop routing events to `session`. Unknown sessions are ignored.
pub(crate) fn unregister(session: &Session) {
    REGISTRY.write().retain(|s| s.id() != session.id());
}

pub(crate) fn is_registered(session: &Session) -> bool {
    REGISTRY.read().iter().any(|s| s.id() == session.id())
}

/// `tracing_subscriber` layer that turns every event into a record and
/// submits it to the running capture session(s).
///
/// The layer itself holds no state, so it can be installed once for the
/// whole process (see [`install_global_subscriber`](crate::init::install_global_subscriber))
/// or composed into an application's own subscriber; sessions come and go
/// underneath it as they are started and stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureLayer {
    _priv: (),
}

impl CaptureLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // Recursive read: a context provider may itself emit events.
        let sessions = REGISTRY.read_recursive();
        if sessions.is_empty() {
            return;
        }

        let meta = event.metadata();
        let mut fields = Fields::new();
        fields.insert(record::SEVERITY.to_string(), Severity::from(*meta.level()).into());
        fields.insert(record::SOURCE.to_string(), Value::from("framework"));
        fields.insert(record::LOGGER_NAME.to_string(), Value::from(meta.target()));
        if let Some(module) = meta.module_path() {
            fields.insert(record::MODULE.to_string(), Value::from(module));
        }
        if let Some(span) = ctx.lookup_current() {
            fields.insert(record::FUNCTION.to_string(), Value::from(span.name()));
        }
        if let Some(file) = meta.file() {
            fields.insert(record::FILE.to_string(), Value::from(file));
        }
        if let Some(line) = meta.line() {
            fields.insert(record::LINE.to_string(), Value::from(line));
        }

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: None,
            exception: None,
        };
        event.record(&mut visitor);
        let FieldVisitor {
            message, exception, ..
        } = visitor;

        fields.insert(record::BODY.to_string(), Value::from(message.unwrap_or_default()));
        if let Some(exception) = exception {
            fields.entry(record::EXCEPTION.to_string()).or_insert(Value::from(exception));
        }

        for session in sessions.iter() {
            session.submit(fields.clone());
        }
    }
}

/// Collects event fields; `message` becomes the body and errors recorded
/// via `record_error` also produce the `exception` text.
pub(crate) struct FieldVisitor<'a> {
    fields: &'a mut Fields,
    message: Option<String>,
    exception: Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.fields.insert(field.name().to_string(), Value::from(value.to_string()));
        if self.exception.is_none() {
            self.exception = Some(format_error_chain(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}

fn format_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(text, "\nCaused by: {}", cause);
        source = cause.source();
    }
    text
}
