use crate::config::CaptureConfig;
use crate::diag::diag;
use crate::error::{Error, Result};
use crate::fields;
use crate::layer;
use crate::queue::BoundedQueue;
use crate::record::{self, Fields, Severity};
use crate::session::{CaptureStats, Session, StatsSnapshot};
use crate::sink::{JsonLinesSink, LogSink};
use crate::stream::StreamCapture;
use crate::writer;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

/// Owns the `Stopped -> Running -> Stopped` lifecycle of log capture.
///
/// A single lock serializes `start` and `stop`; the submit path never
/// touches it. Each successful [`start`](Controller::start) begins a new
/// session and returns a [`CaptureHandle`] bound to it.
#[derive(Clone, Default)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

#[derive(Default)]
struct ControllerInner {
    state: Mutex<Option<Running>>,
}

struct Running {
    session: Arc<Session>,
    writer: JoinHandle<()>,
    streams: Option<StreamCapture>,
    framework: bool,
    max_drain: Duration,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing into `config.target_path`.
    ///
    /// **Returns**
    /// - a [`CaptureHandle`] for the new session.
    /// - [`Error::AlreadyRunning`] if a session is active.
    /// - [`Error::OpenTarget`] if the file cannot be opened for appending.
    pub fn start(&self, config: CaptureConfig) -> Result<CaptureHandle> {
        self.inner.start(config, None)
    }

    /// Like [`start`](Controller::start), but the writer drains into `sink`
    /// instead of opening `config.target_path`.
    ///
    /// The target path is still what the session reports. Fails only with
    /// [`Error::AlreadyRunning`] or [`Error::SpawnWriter`].
    pub fn start_with_sink(
        &self,
        config: CaptureConfig,
        sink: impl LogSink + 'static,
    ) -> Result<CaptureHandle> {
        self.inner.start(config, Some(Box::new(sink)))
    }

    /// Stop the active session, draining queued records first.
    ///
    /// Does nothing when already stopped.
    pub fn stop(&self) {
        self.inner.stop_session(None);
    }

    pub fn state(&self) -> LifecycleState {
        if self.inner.state.lock().is_some() {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    /// Handle to the active session, if any.
    pub fn handle(&self) -> Option<CaptureHandle> {
        self.inner.state.lock().as_ref().map(|running| CaptureHandle {
            session: Arc::clone(&running.session),
            controller: Arc::clone(&self.inner),
        })
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").field("state", &self.state()).finish()
    }
}

impl ControllerInner {
    fn start(
        self: &Arc<Self>,
        config: CaptureConfig,
        sink: Option<Box<dyn LogSink>>,
    ) -> Result<CaptureHandle> {
        let config = config.sanitized();
        let mut state = self.state.lock();
        if let Some(running) = state.as_ref() {
            return Err(Error::AlreadyRunning {
                path: running.session.target_path().to_path_buf(),
            });
        }

        let sink: Box<dyn LogSink> = match sink {
            Some(sink) => sink,
            None => Box::new(JsonLinesSink::open(&config.target_path).map_err(|source| {
                Error::OpenTarget {
                    path: config.target_path.clone(),
                    source,
                }
            })?),
        };

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let stats = Arc::new(CaptureStats::default());
        let context = if config.include_context_fields {
            config.context_provider.clone()
        } else {
            None
        };
        let session = Arc::new(Session::new(
            Arc::clone(&queue),
            Arc::clone(&stats),
            context,
            config.target_path.clone(),
        ));

        let writer = writer::spawn(queue, sink, stats, config.poll_interval)
            .map_err(Error::SpawnWriter)?;

        if config.capture_framework {
            if config.install_global_subscriber {
                crate::init::ensure_global_subscriber(config.echo_to_console);
            }
            layer::register(&session);
        }

        let streams = config.capture_streams.then(|| StreamCapture::install(&session));

        session.submit(fields! {
            record::SEVERITY => Severity::Info,
            record::BODY => "log capture started",
            record::SOURCE => "controller",
            "target_path" => config.target_path.display().to_string(),
            "queue_capacity" => config.queue_capacity,
            "capture_streams" => config.capture_streams,
        });

        *state = Some(Running {
            session: Arc::clone(&session),
            writer,
            streams,
            framework: config.capture_framework,
            max_drain: config.max_drain,
        });

        Ok(CaptureHandle {
            session,
            controller: Arc::clone(self),
        })
    }

    /// Stop the active session; with `only`, just when it is that session.
    fn stop_session(&self, only: Option<&Session>) {
        let mut state = self.state.lock();
        let matches = match state.as_ref() {
            Some(running) => only.map_or(true, |s| s.id() == running.session.id()),
            None => false,
        };
        if !matches {
            return;
        }
        if let Some(running) = state.take() {
            running.shutdown();
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().take() {
            running.shutdown();
        }
    }
}

impl Running {
    fn shutdown(mut self) {
        let stats = self.session.stats().snapshot();
        self.session.submit(fields! {
            record::SEVERITY => Severity::Info,
            record::BODY => "log capture stopped",
            record::SOURCE => "controller",
            "accepted_records" => stats.accepted,
            "dropped_records" => stats.dropped,
        });

        if self.framework {
            layer::unregister(&self.session);
        }
        if let Some(mut streams) = self.streams.take() {
            streams.restore();
        }

        self.session.stop_accepting();
        let queue = self.session.queue();
        queue.close();

        if queue.drain_and_wait(self.max_drain) {
            if self.writer.join().is_err() {
                diag!("log writer thread panicked");
            }
        } else {
            // Force-close: the detached writer exits after its current write
            // and drops the file.
            let discarded = queue.abort();
            diag!(
                "log writer did not drain within {:?}, discarded {} queued records",
                self.max_drain,
                discarded
            );
        }
    }
}

/// Handle to one capture session, returned by [`Controller::start`].
///
/// Cheap to clone. Once its session has stopped, submissions through the
/// handle are discarded and [`stop`](CaptureHandle::stop) does nothing,
/// even if the controller has since started a new session.
#[derive(Clone)]
pub struct CaptureHandle {
    session: Arc<Session>,
    controller: Arc<ControllerInner>,
}

impl CaptureHandle {
    /// Submit a free-form record. Fire-and-forget: full-queue drops and
    /// submissions after stop are silent.
    pub fn submit(&self, fields: Fields) {
        self.session.submit(fields);
    }

    /// Manually log a structured message.
    ///
    /// `severity` and `body` win over the same keys in `fields`; other
    /// fields are kept as given.
    pub fn log(&self, severity: Severity, body: impl Into<String>, mut fields: Fields) {
        fields.insert(record::SEVERITY.to_string(), severity.into());
        fields.insert(record::BODY.to_string(), Value::from(body.into()));
        fields
            .entry(record::SOURCE.to_string())
            .or_insert_with(|| Value::from("manual"));
        self.session.submit(fields);
    }

    /// Stop this handle's session. Idempotent.
    pub fn stop(&self) {
        self.controller.stop_session(Some(self.session.as_ref()));
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.session.stats().snapshot()
    }

    pub fn target_path(&self) -> &Path {
        self.session.target_path()
    }

    /// Whether the `tracing` adapter currently forwards to this session.
    pub fn is_capturing_framework(&self) -> bool {
        layer::is_registered(&self.session)
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("target_path", &self.session.target_path())
            .field("running", &self.session.is_running())
            .finish()
    }
}
