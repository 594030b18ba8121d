//! Bounded ready queue shared by submitters and workers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::heap::Heap;
use super::priority::QueueEntry;

/// What `submit` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueFullPolicy {
    /// Fail fast with a queue-full error.
    #[default]
    Reject,
    /// Wait until a worker frees a slot.
    Block,
}

/// Configuration for the task queue.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub max_size: usize,
    pub policy: QueueFullPolicy,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self { max_size: 256, policy: QueueFullPolicy::Reject }
    }
}

struct QueueState {
    ready: Heap<QueueEntry>,
    /// Entries waiting in the delay queue. They count toward capacity.
    parked: usize,
}

impl QueueState {
    fn len(&self) -> usize {
        self.ready.len() + self.parked
    }
}

/// Priority queue of ready entries.
///
/// Capacity applies to caller submissions only; entries coming back from
/// retry or rate-limit deferral are always accepted.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    max_size: usize,
    next_sequence: AtomicU64,
    closed: AtomicBool,
    /// Signalled when entries become ready, or the queue drains after close.
    available: Notify,
    /// Signalled when a slot frees up, or the queue is closed.
    space: Notify,
}

impl TaskQueue {
    pub fn new(config: TaskQueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState { ready: Heap::new(), parked: 0 }),
            max_size: config.max_size.max(1),
            next_sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            available: Notify::new(),
            space: Notify::new(),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert a new submission unless the queue is full or closed.
    /// The entry is handed back on failure.
    pub fn try_push(&self, entry: QueueEntry) -> Result<(), (QueueEntry, PushError)> {
        if self.is_closed() {
            return Err((entry, PushError::Closed));
        }
        let mut state = self.state.lock();
        if state.len() >= self.max_size {
            return Err((entry, PushError::Full));
        }
        state.ready.push(entry);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Insert a new submission, waiting for space while the queue is full.
    pub async fn push_blocking(&self, mut entry: QueueEntry) -> Result<(), (QueueEntry, PushError)> {
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_push(entry) {
                Ok(()) => return Ok(()),
                Err((returned, PushError::Full)) => entry = returned,
                Err(closed) => return Err(closed),
            }
            space.await;
        }
    }

    /// Account for an entry moving into the delay queue.
    pub(crate) fn park(&self) {
        self.state.lock().parked += 1;
    }

    /// Move a delayed entry back into the ready heap.
    pub(crate) fn unpark(&self, entry: QueueEntry) {
        let mut state = self.state.lock();
        state.ready.push(entry);
        state.parked = state.parked.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    /// Forget delayed entries that will never be released.
    pub(crate) fn discard_parked(&self, count: usize) {
        let mut state = self.state.lock();
        state.parked = state.parked.saturating_sub(count);
        let drained = state.len() == 0;
        drop(state);
        if drained {
            self.available.notify_waiters();
        }
    }

    /// Remove the highest-priority ready entry.
    pub fn pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        let entry = state.ready.pop()?;
        let drained = state.len() == 0;
        drop(state);

        self.space.notify_one();
        if drained && self.is_closed() {
            self.available.notify_waiters();
        }
        Some(entry)
    }

    /// Wait for the next ready entry. Returns `None` once the queue is
    /// closed and nothing is ready or parked.
    pub async fn wait_and_pop(&self) -> Option<QueueEntry> {
        loop {
            let available = self.available.notified();
            tokio::pin!(available);
            available.as_mut().enable();

            if let Some(entry) = self.pop() {
                return Some(entry);
            }
            if self.is_closed() && self.is_drained() {
                return None;
            }
            available.await;
        }
    }

    /// Stop accepting submissions and release blocked submitters.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.space.notify_waiters();
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// True when nothing is ready and nothing is parked.
    pub fn is_drained(&self) -> bool {
        self.state.lock().len() == 0
    }

    /// Ready plus parked entries.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all ready entries, in unspecified order.
    pub(crate) fn drain_ready(&self) -> Vec<QueueEntry> {
        self.state.lock().ready.drain()
    }
}

/// Reasons a submission could not enter the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
    Closed,
}
