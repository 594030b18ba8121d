//! Scheduler admission and lifecycle errors.

/// Errors surfaced to callers of the scheduler API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("task queue is full")]
    QueueFull,

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("no tokio runtime available to spawn workers")]
    NoRuntime,
}
