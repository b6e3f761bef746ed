//! Thread-safe capture of structured logs into a single JSON-lines file.
//!
//! Producers (the [`CaptureLayer`] for `tracing` events, the stdout/stderr
//! [`stream`] interceptors, and manual calls on a [`CaptureHandle`]) submit
//! records into a bounded queue without ever blocking; one writer thread
//! appends them to the target file, one JSON object per line.
//!
//! ```no_run
//! use tracing_live_logs::{CaptureConfig, Controller, Severity, fields};
//!
//! let controller = Controller::new();
//! let handle = controller.start(CaptureConfig::new("app.log"))?;
//! tracing::info!(user_id = 7, "signed in");
//! handle.log(Severity::Warn, "cache miss", fields! { "key" => "users:7" });
//! handle.stop();
//! # Ok::<(), tracing_live_logs::Error>(())
//! ```

mod diag;

pub mod config;
pub mod controller;
pub mod error;
pub mod init;
pub mod layer;
pub mod queue;
pub mod record;
pub mod session;
pub mod sink;
pub mod stream;
mod writer;

pub use config::{CaptureConfig, ContextProvider};
pub use controller::{CaptureHandle, Controller, LifecycleState};
pub use error::{Error, Result};
pub use layer::CaptureLayer;
pub use record::{normalize, Fields, LogRecord, Severity};
pub use session::{CaptureStats, StatsSnapshot};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
