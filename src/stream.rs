//! Process-wide stdout/stderr slots and the capturing decorator that can be
//! installed in them.
//!
//! Rust code cannot swap out `std::io::stdout()`, so output that should be
//! capturable is written through [`stdout()`] and [`stderr()`] (or the
//! [`println_captured!`](crate::println_captured) macros). Each slot holds
//! the writer currently in charge of that stream; by default that is the
//! real process stream.

use crate::diag::diag;
use crate::record::{self, Fields, Severity};
use crate::session::Session;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// A writer that can be shared between threads and installed in a slot.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Longest partial line kept before it is emitted without a newline.
const MAX_PENDING: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn name(&self) -> &'static str {
        match self {
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            StdStream::Stdout => Severity::Info,
            StdStream::Stderr => Severity::Error,
        }
    }

    fn slot(&self) -> &'static RwLock<Slot> {
        match self {
            StdStream::Stdout => &STDOUT,
            StdStream::Stderr => &STDERR,
        }
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The writer in charge of a stream, plus every interceptor installed in
/// its chain.
struct Slot {
    writer: SharedWriter,
    interceptors: Vec<Arc<Mutex<StreamInterceptor>>>,
}

impl Slot {
    fn new(writer: SharedWriter) -> RwLock<Self> {
        RwLock::new(Self {
            writer,
            interceptors: Vec::new(),
        })
    }
}

static STDOUT: Lazy<RwLock<Slot>> = Lazy::new(|| Slot::new(Arc::new(Mutex::new(io::stdout()))));
static STDERR: Lazy<RwLock<Slot>> = Lazy::new(|| Slot::new(Arc::new(Mutex::new(io::stderr()))));

/// Whether `writer` is the very object behind `target`.
fn points_to<T: ?Sized>(writer: &SharedWriter, target: &Arc<T>) -> bool {
    Arc::as_ptr(writer) as *const u8 == Arc::as_ptr(target) as *const u8
}

/// The writer currently installed for `stream`.
pub fn current(stream: StdStream) -> SharedWriter {
    Arc::clone(&stream.slot().read().writer)
}

/// Install `writer` for `stream`, returning the previous one.
///
/// Meant for hosts that route program output somewhere other than the
/// process streams (a notebook kernel, a test buffer). Redirecting while a
/// capture session intercepts the stream bypasses the interceptor, and the
/// redirect stays in place when that session stops.
pub fn redirect(stream: StdStream, writer: SharedWriter) -> SharedWriter {
    std::mem::replace(&mut stream.slot().write().writer, writer)
}

/// Handle writing to whatever is installed for a stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamHandle {
    stream: StdStream,
}

pub fn stdout() -> StreamHandle {
    StreamHandle {
        stream: StdStream::Stdout,
    }
}

pub fn stderr() -> StreamHandle {
    StreamHandle {
        stream: StdStream::Stderr,
    }
}

impl Write for StreamHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Clone the target out so a concurrent install/restore never waits
        // on an in-progress write.
        let target = current(self.stream);
        let mut target = target.lock();
        target.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let target = current(self.stream);
        let mut target = target.lock();
        target.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let target = current(self.stream);
        let mut target = target.lock();
        target.flush()
    }

    /// Formats first so a `writeln!` reaches the target as one write and
    /// lines from different threads never interleave.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        match args.as_str() {
            Some(text) => self.write_all(text.as_bytes()),
            None => self.write_all(fmt::format(args).as_bytes()),
        }
    }
}

/// Like `println!`, but through the capturable stdout slot.
#[macro_export]
macro_rules! println_captured {
    () => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::stream::stdout());
    }};
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::stream::stdout(), $($arg)*);
    }};
}

/// Like `eprintln!`, but through the capturable stderr slot.
#[macro_export]
macro_rules! eprintln_captured {
    () => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::stream::stderr());
    }};
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::stream::stderr(), $($arg)*);
    }};
}

/// Decorator forwarding every byte to the wrapped writer and submitting
/// each non-blank line as a record.
///
/// Bytes are forwarded immediately, but the record for output without a
/// trailing newline is held back until the newline arrives, the stream is
/// flushed, or capture stops.
pub(crate) struct StreamInterceptor {
    stream: StdStream,
    inner: SharedWriter,
    session: Arc<Session>,
    pending: Vec<u8>,
}

impl StreamInterceptor {
    pub(crate) fn new(stream: StdStream, inner: SharedWriter, session: Arc<Session>) -> Self {
        Self {
            stream,
            inner,
            session,
            pending: Vec::new(),
        }
    }

    fn capture(&mut self, buf: &[u8]) {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line);
        }
        if self.pending.len() > MAX_PENDING {
            self.emit_pending();
        }
    }

    fn emit_pending(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
    }

    fn emit(&self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            return;
        }
        let mut fields = Fields::new();
        fields.insert(record::SEVERITY.to_string(), self.stream.severity().into());
        fields.insert(record::BODY.to_string(), Value::from(text.trim_end()));
        fields.insert(record::SOURCE.to_string(), Value::from("stream"));
        fields.insert(record::STREAM_NAME.to_string(), Value::from(self.stream.name()));
        self.session.submit(fields);
    }
}

impl Write for StreamInterceptor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let mut inner = self.inner.lock();
            inner.write_all(buf)?;
            inner.flush()?;
        }
        self.capture(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_pending();
        self.inner.lock().flush()
    }
}

/// Interceptors installed for one session, with the writers they replaced.
pub(crate) struct StreamCapture {
    installed: Vec<Installed>,
}

struct Installed {
    stream: StdStream,
    interceptor: Arc<Mutex<StreamInterceptor>>,
}

impl StreamCapture {
    /// Install interceptors in both slots, on top of whatever is there.
    pub(crate) fn install(session: &Arc<Session>) -> Self {
        let installed = [StdStream::Stdout, StdStream::Stderr]
            .into_iter()
            .map(|stream| {
                let mut slot = stream.slot().write();
                let interceptor = Arc::new(Mutex::new(StreamInterceptor::new(
                    stream,
                    Arc::clone(&slot.writer),
                    Arc::clone(session),
                )));
                let shared: SharedWriter = interceptor.clone();
                slot.writer = shared;
                slot.interceptors.push(Arc::clone(&interceptor));
                Installed { stream, interceptor }
            })
            .collect();
        Self { installed }
    }

    /// Take the interceptors out of their chains and emit any pending
    /// partial lines.
    ///
    /// An interceptor still on top of its slot hands the slot back to the
    /// writer it wrapped. One that another session has since wrapped is
    /// unlinked from under it, so sessions may stop in any order. Calling
    /// this more than once is a no-op.
    pub(crate) fn restore(&mut self) {
        for installed in self.installed.drain(..) {
            let Installed { stream, interceptor } = installed;
            let mut slot = stream.slot().write();
            let previous = Arc::clone(&interceptor.lock().inner);
            slot.interceptors.retain(|other| !Arc::ptr_eq(other, &interceptor));

            if points_to(&slot.writer, &interceptor) {
                slot.writer = previous;
            } else {
                let outer = slot
                    .interceptors
                    .iter()
                    .find(|other| points_to(&other.lock().inner, &interceptor));
                match outer {
                    Some(outer) => outer.lock().inner = previous,
                    None => diag!(
                        "{} was redirected during capture, leaving the redirect in place",
                        stream
                    ),
                }
            }
            drop(slot);
            interceptor.lock().emit_pending();
        }
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        self.restore();
    }
}
