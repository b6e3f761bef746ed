use crate::diag::diag;
use crate::queue::BoundedQueue;
use crate::record::LogRecord;
use crate::session::CaptureStats;
use crate::sink::LogSink;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) const WRITER_THREAD_NAME: &str = "live-logs-writer";

/// Spawn the single writer thread that drains `queue` into `sink`.
///
/// The thread exits once the queue has been closed and is empty. The sink
/// is moved into the thread and dropped (closing the file) on exit.
pub(crate) fn spawn(
    queue: Arc<BoundedQueue<LogRecord>>,
    sink: Box<dyn LogSink>,
    stats: Arc<CaptureStats>,
    poll_interval: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WRITER_THREAD_NAME.to_string())
        .spawn(move || run(&queue, sink, &stats, poll_interval))
}

fn run(
    queue: &BoundedQueue<LogRecord>,
    mut sink: Box<dyn LogSink>,
    stats: &CaptureStats,
    poll_interval: Duration,
) {
    loop {
        match queue.take(poll_interval) {
            Some(record) => {
                match sink.send(&record) {
                    Ok(()) => {
                        stats.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.write_failures.fetch_add(1, Ordering::Relaxed);
                        diag!("failed to write log record: {}", e);
                    }
                }
                queue.task_done();
            }
            None => {
                if queue.is_closed() && queue.is_empty() {
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.flush() {
        diag!("failed to flush log sink: {}", e);
    }
}
