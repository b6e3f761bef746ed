use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO shared by many producers and a single consumer.
///
/// Enqueueing never blocks: when the queue is full the *new* item is
/// dropped (drop-newest) and [`submit`](BoundedQueue::submit) returns
/// `false`. The internal mutex is only held for O(1) push/pop work.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    idle: Condvar,
    capacity: usize,
}

struct State<T> {
    items: VecDeque<T>,
    /// Items submitted but not yet acknowledged with `task_done`.
    unfinished: usize,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                unfinished: 0,
                closed: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue `item` unless the queue is full or closed.
    ///
    /// Returns `true` if the item was accepted. A rejected item is dropped.
    pub fn submit(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.items.len() >= self.capacity {
            return false;
        }
        state.items.push_back(item);
        state.unfinished += 1;
        drop(state);
        self.available.notify_one();
        true
    }

    /// Take the oldest item, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout, or immediately once the queue is closed
    /// and empty.
    pub fn take(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.items.pop_front();
            }
        }
    }

    /// Acknowledge that an item returned by [`take`](BoundedQueue::take)
    /// has been fully processed.
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.idle.notify_all();
        }
    }

    /// Block until every accepted item has been taken and acknowledged.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn drain_and_wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.unfinished == 0;
            }
        }
        true
    }

    /// Stop accepting new items. Items already queued can still be taken.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Close the queue and discard whatever is still queued.
    ///
    /// Returns the number of discarded items.
    pub fn abort(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let discarded = state.items.len();
        state.items.clear();
        state.unfinished = state.unfinished.saturating_sub(discarded);
        drop(state);
        self.available.notify_all();
        self.idle.notify_all();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
