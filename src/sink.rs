use crate::record::LogRecord;
use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination for [`LogRecord`]s drained by the writer thread.
///
/// The writer owns its sink exclusively, so implementations need not be
/// `Sync`. A failed `send` is reported and skipped; the writer moves on to
/// the next record.
pub trait LogSink: Send {
    /// Persist a single record.
    ///
    /// **Returns**
    /// - `Ok(())` if the record reached the backend.
    /// - `Err(..)` on serialization or I/O failure. The record is lost.
    fn send(&mut self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered data. Default implementation is a no-op.
    fn flush(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Appends each record as one JSON object per line and flushes after
/// every write.
///
/// If a write fails partway through a line, the next record starts with a
/// newline so the fragment stays on its own line.
pub struct JsonLinesSink<W: Write + Send = File> {
    out: W,
    path: Option<PathBuf>,
    line: Vec<u8>,
    /// Last byte written was not a newline.
    torn: bool,
}

impl JsonLinesSink<File> {
    /// Open `path` in append mode, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: file,
            path: Some(path.to_path_buf()),
            line: Vec::with_capacity(256),
            torn: false,
        })
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(out: W) -> Self {
        Self {
            out,
            path: None,
            line: Vec::with_capacity(256),
            torn: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// `write_all` that tracks whether the output ends mid-line.
    fn write_line(&mut self) -> io::Result<()> {
        let mut written = 0;
        while written < self.line.len() {
            match self.out.write(&self.line[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    written += n;
                    self.torn = self.line[written - 1] != b'\n';
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> LogSink for JsonLinesSink<W> {
    fn send(&mut self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        // Serialize fully before touching the file so a serialization error
        // writes nothing.
        self.line.clear();
        if self.torn {
            self.line.push(b'\n');
        }
        serde_json::to_writer(&mut self.line, record)?;
        self.line.push(b'\n');
        self.write_line()?;
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.out.flush()?;
        Ok(())
    }
}
