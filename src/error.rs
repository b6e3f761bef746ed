use std::path::PathBuf;

/// Errors surfaced on the control path (`start`, bootstrap).
///
/// Producer-path problems (full queue, failed writes) never show up here;
/// they are absorbed and counted in [`CaptureStats`](crate::controller::CaptureStats).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("log capture is already running (target: {})", path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("failed to open log target {}: {source}", path.display())]
    OpenTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn writer thread: {0}")]
    SpawnWriter(#[source] std::io::Error),

    #[error("environment variable {0} not set, logging not started")]
    TargetPathUnset(&'static str),

    #[error("invalid value for environment variable {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("failed to set global tracing subscriber: {0}")]
    GlobalSubscriber(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
