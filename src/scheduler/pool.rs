//! Fixed-size pool of worker tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::core::Shared;
use super::worker::spawn_worker;

/// Owns the join handles of the N worker tasks.
pub struct WorkerPool {
    size: usize,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::with_capacity(size)),
        }
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawn the workers. Returns false if they were already started.
    pub(crate) fn start(&self, shared: &Arc<Shared>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut handles = self.handles.lock();
        for worker_id in 0..self.size {
            handles.push(spawn_worker(worker_id, Arc::clone(shared)));
        }
        true
    }

    /// Workers whose task has not finished.
    pub fn live_workers(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every worker to exit, up to `deadline`.
    /// Returns true if all exited; stragglers stay tracked.
    pub async fn join_until(&self, deadline: Instant) -> bool {
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut pending = Vec::new();
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!(error = %e, "worker panicked");
                }
                Ok(_) => {}
                Err(_) => pending.push(handle),
            }
        }
        let all_exited = pending.is_empty();
        self.handles.lock().extend(pending);
        all_exited
    }

    /// Request cancellation of every tracked worker. Handles stay tracked
    /// so a following `join_until` can observe them exit.
    pub fn abort_all(&self) {
        for handle in self.handles.lock().iter() {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.abort_all();
    }
}
