use crate::config::CaptureConfig;
use crate::controller::{CaptureHandle, Controller};
use crate::diag::diag;
use crate::error::{Error, Result};
use crate::layer::CaptureLayer;
use once_cell::sync::{Lazy, OnceCell};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

static GLOBAL_CONTROLLER: Lazy<Controller> = Lazy::new(Controller::new);
static GLOBAL_SUBSCRIBER: OnceCell<()> = OnceCell::new();

/// Install a global `tracing` subscriber made of a [`Registry`] and
/// [`CaptureLayer`].
///
/// **Parameters**
/// - `echo_to_console`: if `true`, a `tracing_subscriber::fmt` layer writing
///   to the process's stderr is added on top, so events still show up in
///   the terminal.
///
/// **Returns**
/// - [`Error::GlobalSubscriber`] if a global subscriber is already set. In
///   that case add [`CaptureLayer`] to the existing subscriber instead.
pub fn install_global_subscriber(echo_to_console: bool) -> Result<()> {
    // Two variants because the layered subscriber types differ.
    let result = if echo_to_console {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let subscriber = Registry::default().with(CaptureLayer::new()).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(CaptureLayer::new());
        tracing::subscriber::set_global_default(subscriber)
    };
    result.map_err(|e| Error::GlobalSubscriber(e.to_string()))
}

/// Try [`install_global_subscriber`] once per process.
pub(crate) fn ensure_global_subscriber(echo_to_console: bool) {
    GLOBAL_SUBSCRIBER.get_or_init(|| {
        if let Err(e) = install_global_subscriber(echo_to_console) {
            diag!("{}; events reach the log file only if CaptureLayer is part of that subscriber", e);
        }
    });
}

/// Process-wide controller used by [`start_logging`].
///
/// The core API never needs this; pass [`CaptureHandle`]s around instead
/// where possible.
pub fn global() -> &'static Controller {
    &GLOBAL_CONTROLLER
}

/// Start the global controller from `LIVE_LOGS_*` environment variables.
///
/// Refuses to start with [`Error::TargetPathUnset`] when
/// `LIVE_LOGS_FILE_PATH` is missing or empty.
pub fn start_logging() -> Result<CaptureHandle> {
    start_logging_with(|config| config)
}

/// Like [`start_logging`], letting the caller adjust the config read from
/// the environment before starting.
pub fn start_logging_with(
    configure: impl FnOnce(CaptureConfig) -> CaptureConfig,
) -> Result<CaptureHandle> {
    let config = configure(CaptureConfig::from_env()?);
    global().start(config)
}
