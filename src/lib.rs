//! gg-sched
//!
//! An in-process task scheduler: callers submit units of work with a
//! priority, a type and an identity, and a fixed pool of async workers
//! executes them.
//!
//! # Guarantees
//!
//! - **Priority**: a ready High task is always dispatched before a ready
//!   Medium or Low one; equal priorities run in submission order.
//! - **Deduplication**: concurrent submissions with the same identity share
//!   a single execution and observe the same result.
//! - **Rate limiting**: per-type token buckets defer dispatch, they never
//!   fail a task.
//! - **Retries**: failed attempts are retried with exponential backoff.
//! - **Isolation**: a panicking task becomes a failed result; the worker
//!   keeps running.
//! - **Shutdown**: graceful drain up to a deadline, then hard cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gg_sched::{Scheduler, SchedulerConfig, Task, TaskPriority};
//!
//! # async fn run() -> Result<(), gg_sched::SchedulerError> {
//! let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(4));
//! scheduler.start()?;
//! scheduler.set_rate_limit("email", 5.0);
//!
//! let task = Task::from_fn("welcome-42", "email", |ctx| async move {
//!     ctx.report_progress(100);
//!     Ok(())
//! })
//! .with_priority(TaskPriority::High);
//!
//! let (result, _progress) = scheduler.submit(task).await?;
//! assert!(result.wait().await.success);
//! scheduler.shutdown(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! `GG_SCHED_*` variables (or a TOML file) describe both the scheduler and
//! its log output:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = gg_sched::config::load();
//! gg_sched::telemetry::init_logging(&config.logging)?;
//!
//! let scheduler = gg_sched::from_config(&config);
//! scheduler.start()?;
//! scheduler.shutdown_default().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

pub use config::{ConfigError, EffectiveConfig, EnvConfig};
pub use scheduler::{
    ProgressHandle, QueueFullPolicy, ResultHandle, RetryPolicy, Scheduler, SchedulerConfig,
    SchedulerError, StatsCollector, StatsSnapshot, Task, TaskContext, TaskError, TaskHandler,
    TaskPriority, TaskResult, TaskState,
};
pub use shutdown::{ShutdownResult, ShutdownState};
pub use telemetry::{LogConfig, LogFormat};

/// Build a scheduler from loaded configuration, with its rate limits applied.
///
/// The scheduler is not started.
pub fn from_config(config: &EnvConfig) -> Scheduler {
    let scheduler = Scheduler::new(config.scheduler.clone());
    scheduler.apply_rate_limits(&config.rate_limits);
    scheduler
}
