use crate::error::{Error, Result};
use crate::record::Fields;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Target file path. Required by [`CaptureConfig::from_env`].
pub const LIVE_LOGS_FILE_PATH_ENV: &str = "LIVE_LOGS_FILE_PATH";

/// Optional queue capacity override.
pub const LIVE_LOGS_QUEUE_CAPACITY_ENV: &str = "LIVE_LOGS_QUEUE_CAPACITY";

/// Optional stdout/stderr capture switch (`1`/`true`/`yes`/`on`).
pub const LIVE_LOGS_CAPTURE_STREAMS_ENV: &str = "LIVE_LOGS_CAPTURE_STREAMS";

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DRAIN: Duration = Duration::from_secs(5);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Supplies extra fields (e.g. a notebook cell number) for every record.
pub trait ContextProvider: Send + Sync {
    fn context_fields(&self) -> Fields;
}

impl<F> ContextProvider for F
where
    F: Fn() -> Fields + Send + Sync,
{
    fn context_fields(&self) -> Fields {
        self()
    }
}

/// Configuration of a capture session.
///
/// **Fields**
/// - `target_path`: file the writer appends JSON lines to.
/// - `queue_capacity`: records buffered before new ones are dropped.
/// - `include_context_fields`: merge `context_provider` fields into records.
/// - `capture_streams`: intercept the crate's stdout/stderr slots. Each
///   line becomes one record; a partial line is recorded once its newline
///   arrives, the stream is flushed, or capture stops.
/// - `capture_framework`: forward `tracing` events seen by
///   [`CaptureLayer`](crate::layer::CaptureLayer).
/// - `install_global_subscriber`: try to install a global subscriber with
///   the capture layer on start.
/// - `echo_to_console`: add a `fmt` layer to that global subscriber.
/// - `poll_interval`: how long the writer waits for a record before
///   re-checking for shutdown.
/// - `max_drain`: upper bound on how long `stop` waits for the backlog.
#[derive(Clone)]
pub struct CaptureConfig {
    pub target_path: PathBuf,
    pub queue_capacity: usize,
    pub include_context_fields: bool,
    pub capture_streams: bool,
    pub capture_framework: bool,
    pub install_global_subscriber: bool,
    pub echo_to_console: bool,
    pub poll_interval: Duration,
    pub max_drain: Duration,
    pub context_provider: Option<Arc<dyn ContextProvider>>,
}

impl CaptureConfig {
    pub fn new(target_path: impl Into<PathBuf>) -> Self {
        Self {
            target_path: target_path.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            include_context_fields: true,
            capture_streams: false,
            capture_framework: true,
            install_global_subscriber: true,
            echo_to_console: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_drain: DEFAULT_MAX_DRAIN,
            context_provider: None,
        }
    }

    /// Build a config from `LIVE_LOGS_*` environment variables.
    ///
    /// Fails with [`Error::TargetPathUnset`] when the target path variable is
    /// missing or empty.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(LIVE_LOGS_FILE_PATH_ENV).unwrap_or_default();
        if path.trim().is_empty() {
            return Err(Error::TargetPathUnset(LIVE_LOGS_FILE_PATH_ENV));
        }
        let mut config = Self::new(path);

        if let Ok(raw) = std::env::var(LIVE_LOGS_QUEUE_CAPACITY_ENV) {
            config.queue_capacity = raw.trim().parse().map_err(|_| Error::InvalidEnv {
                key: LIVE_LOGS_QUEUE_CAPACITY_ENV,
                value: raw.clone(),
            })?;
        }

        if let Ok(raw) = std::env::var(LIVE_LOGS_CAPTURE_STREAMS_ENV) {
            config.capture_streams = parse_flag(&raw).ok_or_else(|| Error::InvalidEnv {
                key: LIVE_LOGS_CAPTURE_STREAMS_ENV,
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Record output written through [`stream::stdout`](crate::stream::stdout)
    /// and [`stream::stderr`](crate::stream::stderr), one record per line.
    /// Output without a trailing newline is recorded on the next newline,
    /// flush or stop.
    pub fn capture_streams(mut self, enabled: bool) -> Self {
        self.capture_streams = enabled;
        self
    }

    pub fn capture_framework(mut self, enabled: bool) -> Self {
        self.capture_framework = enabled;
        self
    }

    pub fn install_global_subscriber(mut self, enabled: bool) -> Self {
        self.install_global_subscriber = enabled;
        self
    }

    pub fn echo_to_console(mut self, enabled: bool) -> Self {
        self.echo_to_console = enabled;
        self
    }

    pub fn include_context_fields(mut self, enabled: bool) -> Self {
        self.include_context_fields = enabled;
        self
    }

    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context_provider = Some(Arc::new(provider));
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_drain(mut self, timeout: Duration) -> Self {
        self.max_drain = timeout;
        self
    }

    /// Enforce minimal thresholds to avoid degenerate configs.
    pub(crate) fn sanitized(mut self) -> Self {
        self.queue_capacity = self.queue_capacity.max(1);
        if self.poll_interval < MIN_POLL_INTERVAL {
            self.poll_interval = MIN_POLL_INTERVAL;
        }
        self
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("target_path", &self.target_path)
            .field("queue_capacity", &self.queue_capacity)
            .field("include_context_fields", &self.include_context_fields)
            .field("capture_streams", &self.capture_streams)
            .field("capture_framework", &self.capture_framework)
            .field("install_global_subscriber", &self.install_global_subscriber)
            .field("echo_to_console", &self.echo_to_console)
            .field("poll_interval", &self.poll_interval)
            .field("max_drain", &self.max_drain)
            .field("context_provider", &self.context_provider.is_some())
            .finish()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CaptureConfig::new("app.log");
        assert_eq!(config.queue_capacity, 1000);
        assert!(config.include_context_fields);
        assert!(!config.capture_streams);
        assert!(config.capture_framework);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn sanitized_enforces_minimums() {
        let config = CaptureConfig::new("app.log")
            .queue_capacity(0)
            .poll_interval(Duration::from_millis(1))
            .sanitized();
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn closures_provide_context() {
        let config = CaptureConfig::new("app.log")
            .context_provider(|| crate::fields! { "cell_number" => 3 });
        let fields = config.context_provider.unwrap().context_fields();
        assert_eq!(fields.get("cell_number"), Some(&serde_json::json!(3)));
    }
}
