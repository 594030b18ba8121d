//! Task descriptors, execution context and result records.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::priority::TaskPriority;

/// Outcome of a single task execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TaskError {
    /// The handler returned an error. Retryable.
    #[error("task failed: {0}")]
    Failed(String),

    /// The attempt exceeded the task's timeout. Retryable.
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),

    /// The handler panicked. Terminal.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The attempt was cancelled by a hard-deadline shutdown.
    #[error("task cancelled by shutdown deadline")]
    Cancelled,

    /// The scheduler stopped before the task was dispatched.
    #[error("scheduler shut down before task was dispatched")]
    Shutdown,

    /// Admission failed after duplicates had already joined.
    #[error("task rejected at admission: {0}")]
    Rejected(String),
}

impl TaskError {
    /// Convenience constructor for handler failures.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether the retry controller may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut(_))
    }
}

/// Work performed by a task. Invoked once per attempt.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError>;
}

struct FnHandler<F>(F);

#[async_trait::async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        (self.0)(ctx).await
    }
}

/// Non-blocking sender half of a task's progress stream.
///
/// Values that do not fit in the buffer are dropped rather than
/// blocking the handler.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<u8>,
}

impl ProgressSink {
    pub(crate) fn new(tx: mpsc::Sender<u8>) -> Self {
        Self { tx }
    }

    /// Report a progress value. Returns false if it was dropped.
    pub fn report(&self, value: u8) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(value, error = %e, "progress value dropped");
                false
            }
        }
    }
}

/// Per-attempt context handed to a [`TaskHandler`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: Arc<str>,
    attempt: u32,
    cancel: CancellationToken,
    progress: ProgressSink,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: Arc<str>,
        attempt: u32,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Self {
        Self { task_id, attempt, cancel, progress }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 1-indexed attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Check whether this attempt has been cancelled (timeout or shutdown).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when this attempt is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Report progress (typically 0-100). Never blocks.
    pub fn report_progress(&self, value: u8) -> bool {
        self.progress.report(value)
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }
}

/// Immutable unit of work submitted to the scheduler.
pub struct Task {
    id: Arc<str>,
    task_type: String,
    priority: TaskPriority,
    max_retries: u32,
    timeout: Option<Duration>,
    handler: Arc<dyn TaskHandler>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Task {
    /// Create a task with default priority, no retries and no timeout.
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        handler: impl TaskHandler,
    ) -> Self {
        let id: String = id.into();
        Self {
            id: Arc::from(id),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            max_retries: 0,
            timeout: None,
            handler: Arc::new(handler),
        }
    }

    /// Create a task from an async closure.
    pub fn from_fn<F, Fut>(id: impl Into<String>, task_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::new(id, task_type, FnHandler(f))
    }

    /// Create a task with a random UUID identity. Never deduplicated.
    pub fn anonymous(task_type: impl Into<String>, handler: impl TaskHandler) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), task_type, handler)
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Completed,
    Failed,
}

/// Outcome record published once per submitted identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub state: TaskState,
    pub success: bool,
    pub error: Option<TaskError>,
    /// Number of attempts made, including the final one.
    pub attempts: u32,
    /// Wall-clock duration of the final attempt.
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
    /// Set when the final attempt panicked and the worker recovered.
    pub recovered_panic: bool,
}

impl TaskResult {
    pub fn completed(task_id: impl Into<String>, attempts: u32, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Completed,
            success: true,
            error: None,
            attempts,
            duration,
            finished_at: Utc::now(),
            recovered_panic: false,
        }
    }

    pub fn failed(
        task_id: impl Into<String>,
        error: TaskError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Failed,
            success: false,
            recovered_panic: matches!(error, TaskError::Panicked(_)),
            error: Some(error),
            attempts,
            duration,
            finished_at: Utc::now(),
        }
    }
}
