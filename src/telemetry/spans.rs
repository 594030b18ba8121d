//! Span utilities and extension traits for task tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for creating standardized task attempt spans.
pub struct TaskSpan;

impl TaskSpan {
    /// Create a new span for one execution attempt.
    ///
    /// Fields included:
    /// - `task_id`: Caller-supplied task identity
    /// - `task_type`: Rate-limit group of the task
    /// - `attempt`: 1-indexed attempt number
    /// - `worker_id`: Worker executing the attempt
    /// - `status`: To be filled in by `SpanExt::record_result`
    /// - `error.message`: To be filled in on error
    /// - `latency_ms`: To be filled in after completion
    pub fn new(task_id: &str, task_type: &str, attempt: u32, worker_id: usize) -> Span {
        info_span!(
            "task_attempt",
            task_id = %task_id,
            task_type = %task_type,
            attempt,
            worker_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
