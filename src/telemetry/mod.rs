//! Telemetry for the scheduler.
//!
//! Structured logging, per-attempt tracing spans and `metrics` facade hooks.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_queue_depth, record_rate_limited, record_task_completed, record_task_failed,
    record_task_retry, record_task_submitted,
};
pub use spans::{SpanExt, TaskSpan};
