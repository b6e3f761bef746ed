use crate::config::ContextProvider;
use crate::queue::BoundedQueue;
use crate::record::{normalize, Fields, LogRecord};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Counters of a capture session.
#[derive(Debug, Default)]
pub struct CaptureStats {
    /// Submissions made while the session was running.
    pub submitted: AtomicU64,
    /// Successfully enqueued.
    pub accepted: AtomicU64,
    /// Dropped because the queue was full.
    pub dropped: AtomicU64,
    /// Written by the writer.
    pub written: AtomicU64,
    /// Records the writer failed to persist.
    pub write_failures: AtomicU64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub written: u64,
    pub write_failures: u64,
}

/// One `Running` period: the queue, counters and accept flag shared by the
/// producer adapters.
pub(crate) struct Session {
    id: u64,
    running: AtomicBool,
    queue: Arc<BoundedQueue<LogRecord>>,
    stats: Arc<CaptureStats>,
    context: Option<Arc<dyn ContextProvider>>,
    target_path: PathBuf,
}

impl Session {
    pub(crate) fn new(
        queue: Arc<BoundedQueue<LogRecord>>,
        stats: Arc<CaptureStats>,
        context: Option<Arc<dyn ContextProvider>>,
        target_path: PathBuf,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            running: AtomicBool::new(true),
            queue,
            stats,
            context,
            target_path,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn stop_accepting(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    pub(crate) fn queue(&self) -> &Arc<BoundedQueue<LogRecord>> {
        &self.queue
    }

    pub(crate) fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Normalize and enqueue `fields`. Never blocks.
    ///
    /// Returns `false` when the session is stopped (silently discarded) or
    /// the queue is full (dropped and counted).
    pub(crate) fn submit(&self, mut fields: Fields) -> bool {
        if !self.is_running() {
            return false;
        }
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        if let Some(context) = &self.context {
            for (key, value) in context.context_fields() {
                fields.entry(key).or_insert(value);
            }
        }

        if self.queue.submit(normalize(fields)) {
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}
