//! Diagnostics for the pipeline's own failures.
//!
//! These go straight to the process's real stderr. They must never be
//! routed through `tracing` or the stream slots, or a failing pipeline
//! would feed itself.

macro_rules! diag {
    ($($arg:tt)*) => {
        eprintln!("[live-logs] {}", format_args!($($arg)*))
    };
}

pub(crate) use diag;
