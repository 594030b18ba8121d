//! In-flight deduplication by task identity.
//!
//! The first submission of an identity creates fresh result and progress
//! handles; duplicates arriving while it is pending or running receive
//! handles to the same shared state. The entry is removed when the result
//! is published, so the identity can then be submitted again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::task::{ProgressSink, TaskError, TaskResult};

/// Floor for the progress buffer.
pub const MIN_PROGRESS_BUFFER: usize = 10;

/// Shared handle to a task's eventual result.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    task_id: Arc<str>,
    slot: Arc<watch::Sender<Option<TaskResult>>>,
}

impl ResultHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// The result if already published.
    pub fn try_result(&self) -> Option<TaskResult> {
        self.slot.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait for the terminal result.
    pub async fn wait(&self) -> TaskResult {
        let mut rx = self.slot.subscribe();
        if let Ok(published) = rx.wait_for(Option::is_some).await {
            if let Some(result) = published.as_ref() {
                return result.clone();
            }
        }
        // The handle owns the sender, so the channel never closes under us.
        TaskResult::failed(self.task_id.as_ref(), TaskError::Shutdown, 0, Duration::ZERO)
    }

    /// True when both handles observe the same execution.
    pub fn same_as(&self, other: &ResultHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    fn publish(&self, result: TaskResult) {
        self.slot.send_replace(Some(result));
    }
}

/// Shared receiver for a task's progress updates.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<u8>>>,
}

impl ProgressHandle {
    /// Next progress value. `None` once the task finished and the buffer is empty.
    pub async fn recv(&self) -> Option<u8> {
        self.rx.lock().await.recv().await
    }

    /// Next buffered progress value without waiting.
    pub fn try_recv(&self) -> Option<u8> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn same_as(&self, other: &ProgressHandle) -> bool {
        Arc::ptr_eq(&self.rx, &other.rx)
    }
}

/// Outcome of [`DedupRegistry::register_or_join`].
#[derive(Debug)]
pub struct Registration {
    pub result: ResultHandle,
    pub progress: ProgressHandle,
    /// Sender half of the progress stream, for the executing worker.
    pub sink: ProgressSink,
    /// False when the caller joined an existing execution.
    pub is_new: bool,
}

struct Inflight {
    result: ResultHandle,
    progress: ProgressHandle,
    sink: ProgressSink,
}

/// Identity → in-flight handles.
pub struct DedupRegistry {
    entries: Mutex<HashMap<String, Inflight>>,
    progress_buffer: usize,
}

impl DedupRegistry {
    pub fn new(progress_buffer: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            progress_buffer: progress_buffer.max(MIN_PROGRESS_BUFFER),
        }
    }

    /// Register a new identity or join the execution already in flight.
    pub fn register_or_join(&self, task_id: &str) -> Registration {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(task_id) {
            return Registration {
                result: existing.result.clone(),
                progress: existing.progress.clone(),
                sink: existing.sink.clone(),
                is_new: false,
            };
        }

        let (slot, _) = watch::channel(None);
        let (tx, rx) = mpsc::channel(self.progress_buffer);
        let inflight = Inflight {
            result: ResultHandle { task_id: Arc::from(task_id), slot: Arc::new(slot) },
            progress: ProgressHandle { rx: Arc::new(tokio::sync::Mutex::new(rx)) },
            sink: ProgressSink::new(tx),
        };
        let registration = Registration {
            result: inflight.result.clone(),
            progress: inflight.progress.clone(),
            sink: inflight.sink.clone(),
            is_new: true,
        };
        entries.insert(task_id.to_string(), inflight);
        registration
    }

    /// Publish the terminal result and release the identity.
    /// Returns false if the identity was not registered.
    pub fn publish(&self, task_id: &str, result: TaskResult) -> bool {
        let removed = self.entries.lock().remove(task_id);
        match removed {
            Some(inflight) => {
                inflight.result.publish(result);
                true
            }
            None => false,
        }
    }

    /// Resolve every identity still registered with `error` and release
    /// them all. Returns how many were resolved.
    pub fn fail_all(&self, error: TaskError) -> usize {
        let drained: Vec<(String, Inflight)> = self.entries.lock().drain().collect();
        for (task_id, inflight) in &drained {
            let result = TaskResult::failed(task_id.as_str(), error.clone(), 0, Duration::ZERO);
            inflight.result.publish(result);
        }
        drained.len()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.lock().contains_key(task_id)
    }

    /// Number of identities currently in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
