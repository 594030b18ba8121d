//! Delayed re-enqueue of retried and rate-deferred entries.
//!
//! Entries wait in a second heap keyed by eligible time. A single
//! dispatcher task sleeps until the earliest deadline and moves due
//! entries back into the ready queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::heap::{Heap, HeapOrder};
use super::priority::QueueEntry;
use super::queue::TaskQueue;

/// Upper bound on a single dispatcher sleep when the heap is empty.
const IDLE_POLL: Duration = Duration::from_secs(60);

/// Longest delay honored by [`DelayQueue::schedule`]. Larger requests are
/// clamped so the eligible time never overflows `Instant`.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

struct DelayedEntry(QueueEntry);

impl HeapOrder for DelayedEntry {
    fn precedes(&self, other: &Self) -> bool {
        (self.0.ready_at, self.0.sequence) < (other.0.ready_at, other.0.sequence)
    }
}

/// Heap of entries that are not yet eligible to run.
pub struct DelayQueue {
    heap: Mutex<Heap<DelayedEntry>>,
    notify: Notify,
    queue: Arc<TaskQueue>,
}

impl DelayQueue {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { heap: Mutex::new(Heap::new()), notify: Notify::new(), queue }
    }

    /// Make `entry` eligible again after `delay`, measured from now.
    pub fn schedule(&self, mut entry: QueueEntry, delay: Duration) {
        let now = Instant::now();
        entry.ready_at = now
            .checked_add(delay.min(MAX_DELAY))
            .unwrap_or(now + Duration::from_secs(1));
        self.queue.park();
        self.heap.lock().push(DelayedEntry(entry));
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Move every due entry into the ready queue. Returns the eligible
    /// time of the earliest entry still waiting.
    fn release_due(&self, now: Instant) -> Option<Instant> {
        let mut due = Vec::new();
        let next = {
            let mut heap = self.heap.lock();
            while heap.peek().map_or(false, |e| e.0.ready_at <= now) {
                if let Some(DelayedEntry(entry)) = heap.pop() {
                    due.push(entry);
                }
            }
            heap.peek().map(|e| e.0.ready_at)
        };
        for entry in due {
            tracing::trace!(task_id = entry.task.id(), "delayed entry ready");
            self.queue.unpark(entry);
        }
        next
    }

    /// Dispatcher loop. Runs until `stop` is cancelled.
    pub async fn run(&self, stop: CancellationToken) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.release_due(Instant::now());
            let wake_at = next.unwrap_or_else(|| Instant::now() + IDLE_POLL);

            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                () = &mut notified => {}
                () = tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)) => {}
            }
        }
        tracing::debug!("delay dispatcher stopped");
    }

    /// Remove every waiting entry. Used when the scheduler stops.
    pub(crate) fn drain(&self) -> Vec<QueueEntry> {
        let drained: Vec<QueueEntry> =
            self.heap.lock().drain().into_iter().map(|DelayedEntry(e)| e).collect();
        self.queue.discard_parked(drained.len());
        drained
    }
}
