//! Race-free scheduler counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Point-in-time view of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Unique executions admitted (duplicates excluded).
    pub submitted: u64,
    /// Attempts currently executing.
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    /// Retries scheduled after failed attempts.
    pub retried: u64,
    /// Submissions that joined an execution already in flight.
    pub deduplicated: u64,
    /// Dispatches deferred by the rate limiter.
    pub deferred: u64,
}

/// Atomic counters owned by a scheduler.
///
/// `submitted` is incremented before an entry becomes visible to workers
/// and is read last in [`snapshot`](Self::snapshot), so a snapshot never
/// shows `running` or `completed` above `submitted`.
#[derive(Debug, Default)]
pub struct StatsCollector {
    submitted: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    deduplicated: AtomicU64,
    deferred: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo `record_submitted` for a task that never entered the queue.
    pub(crate) fn record_withdrawn(&self) {
        self.submitted.fetch_sub(1, Ordering::SeqCst);
    }

    /// Mark an attempt as running until the guard is dropped.
    pub(crate) fn track_running(self: &Arc<Self>) -> RunningGuard {
        self.running.fetch_add(1, Ordering::SeqCst);
        RunningGuard { stats: Arc::clone(self) }
    }

    pub(crate) fn record_finished(&self, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::SeqCst);
    }

    /// Take a consistent snapshot.
    ///
    /// Terminal counters are read before `running`: an attempt leaves
    /// `running` before it is counted as finished, so no execution is
    /// observed in both.
    pub fn snapshot(&self) -> StatsSnapshot {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let running = self.running.load(Ordering::SeqCst);
        let retried = self.retried.load(Ordering::SeqCst);
        let deduplicated = self.deduplicated.load(Ordering::SeqCst);
        let deferred = self.deferred.load(Ordering::SeqCst);
        let submitted = self.submitted.load(Ordering::SeqCst);
        StatsSnapshot { submitted, running, completed, failed, retried, deduplicated, deferred }
    }
}

/// RAII guard for one running attempt.
pub(crate) struct RunningGuard {
    stats: Arc<StatsCollector>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.stats.running.fetch_sub(1, Ordering::SeqCst);
    }
}
