//! Task scheduling module.
//!
//! Manages task admission, prioritization, deduplication, rate limiting,
//! retries and the worker pool that executes tasks.

mod core;
mod dedup;
mod delay;
mod error;
pub mod heap;
mod pool;
mod priority;
mod queue;
mod rate_limit;
mod retry;
mod stats;
mod task;
mod worker;

pub use self::core::{Scheduler, SchedulerConfig};
pub use dedup::{DedupRegistry, ProgressHandle, Registration, ResultHandle, MIN_PROGRESS_BUFFER};
pub use delay::DelayQueue;
pub use error::SchedulerError;
pub use heap::{Heap, HeapOrder};
pub use pool::WorkerPool;
pub use priority::{QueueEntry, TaskPriority};
pub use queue::{PushError, QueueFullPolicy, TaskQueue, TaskQueueConfig};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::{StatsCollector, StatsSnapshot};
pub use task::{ProgressSink, Task, TaskContext, TaskError, TaskHandler, TaskResult, TaskState};
