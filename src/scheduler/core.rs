//! The scheduler facade: submission, lifecycle and stats.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dedup::{DedupRegistry, ProgressHandle, ResultHandle};
use super::delay::DelayQueue;
use super::error::SchedulerError;
use super::pool::WorkerPool;
use super::priority::QueueEntry;
use super::queue::{PushError, QueueFullPolicy, TaskQueue, TaskQueueConfig};
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use super::stats::{StatsCollector, StatsSnapshot};
use super::task::{Task, TaskError, TaskResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use crate::telemetry;

/// Time given to workers to exit after a hard cancellation before they
/// are aborted.
const HARD_STOP_GRACE: Duration = Duration::from_millis(100);

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of workers (0 = one per CPU).
    pub workers: usize,
    /// Maximum number of waiting caller submissions.
    pub max_queue_size: usize,
    pub queue_full_policy: QueueFullPolicy,
    pub retry: RetryPolicy,
    /// Progress values buffered per task (floor: 10).
    pub progress_buffer: usize,
    /// Deadline used by [`Scheduler::shutdown_default`].
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_queue_size: 256,
            queue_full_policy: QueueFullPolicy::Reject,
            retry: RetryPolicy::default(),
            progress_buffer: 16,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn with_queue_full_policy(mut self, policy: QueueFullPolicy) -> Self {
        self.queue_full_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress_buffer(mut self, progress_buffer: usize) -> Self {
        self.progress_buffer = progress_buffer;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Worker count with auto-detection resolved.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

/// State shared between the facade, the workers and the dispatcher.
pub(crate) struct Shared {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) delay: DelayQueue,
    pub(crate) registry: DedupRegistry,
    pub(crate) limiter: RateLimiter,
    pub(crate) stats: Arc<StatsCollector>,
    pub(crate) retry: RetryPolicy,
    /// Cancelled on hard-deadline shutdown; parent of every attempt token.
    pub(crate) hard_stop: CancellationToken,
}

/// Priority task scheduler with a bounded worker pool.
pub struct Scheduler {
    shared: Arc<Shared>,
    pool: WorkerPool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    coordinator: ShutdownCoordinator,
    policy: QueueFullPolicy,
    shutdown_timeout: Duration,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_stats(config, Arc::new(StatsCollector::new()))
    }

    /// Create a scheduler that records into an existing collector.
    pub fn with_stats(config: SchedulerConfig, stats: Arc<StatsCollector>) -> Self {
        let queue = Arc::new(TaskQueue::new(TaskQueueConfig {
            max_size: config.max_queue_size,
            policy: config.queue_full_policy,
        }));
        let shared = Arc::new(Shared {
            delay: DelayQueue::new(Arc::clone(&queue)),
            queue,
            registry: DedupRegistry::new(config.progress_buffer),
            limiter: RateLimiter::new(),
            stats,
            retry: config.retry.clone(),
            hard_stop: CancellationToken::new(),
        });
        Self {
            shared,
            pool: WorkerPool::new(config.effective_workers()),
            dispatcher: Mutex::new(None),
            coordinator: ShutdownCoordinator::new(),
            policy: config.queue_full_policy,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Launch the workers and the delay dispatcher. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if !self.coordinator.is_accepting() {
            return Err(SchedulerError::ShuttingDown);
        }
        tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        if !self.pool.start(&self.shared) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let stop = self.shared.hard_stop.clone();
        *self.dispatcher.lock() = Some(tokio::spawn(async move {
            shared.delay.run(stop).await;
        }));
        tracing::info!(workers = self.pool.size(), "scheduler started");
        Ok(())
    }

    /// Submit a task, or join the execution already in flight for its id.
    ///
    /// Depending on the configured policy a full queue either fails fast
    /// with [`SchedulerError::QueueFull`] or waits for space.
    pub async fn submit(
        &self,
        task: Task,
    ) -> Result<(ResultHandle, ProgressHandle), SchedulerError> {
        if !self.coordinator.is_accepting() {
            return Err(SchedulerError::ShuttingDown);
        }

        let registration = self.shared.registry.register_or_join(task.id());
        if !registration.is_new {
            tracing::debug!(task_id = task.id(), "joined in-flight task");
            self.shared.stats.record_deduplicated();
            return Ok((registration.result, registration.progress));
        }

        let task_id = task.id().to_string();
        let task_type = task.task_type().to_string();
        let entry = QueueEntry::new(task, self.shared.queue.next_sequence(), registration.sink);

        self.shared.stats.record_submitted();
        let pushed = match self.policy {
            QueueFullPolicy::Reject => self.shared.queue.try_push(entry),
            QueueFullPolicy::Block => self.shared.queue.push_blocking(entry).await,
        };

        if let Err((_, reason)) = pushed {
            let error = match reason {
                PushError::Full => SchedulerError::QueueFull,
                PushError::Closed => SchedulerError::ShuttingDown,
            };
            tracing::debug!(task_id = %task_id, error = %error, "submission rejected");
            self.shared.stats.record_withdrawn();
            // Duplicates may have joined while this submission was pending.
            let result = TaskResult::failed(
                task_id.as_str(),
                TaskError::Rejected(error.to_string()),
                0,
                Duration::ZERO,
            );
            self.shared.registry.publish(&task_id, result);
            return Err(error);
        }

        tracing::debug!(task_id = %task_id, task_type = %task_type, "task submitted");
        telemetry::record_task_submitted(&task_type);
        telemetry::record_queue_depth(self.shared.queue.len());
        Ok((registration.result, registration.progress))
    }

    /// Limit `task_type` to `tokens_per_second` dispatches.
    pub fn set_rate_limit(&self, task_type: impl Into<String>, tokens_per_second: f64) {
        self.shared.limiter.set_limit(task_type, tokens_per_second);
    }

    /// Limit `task_type` with an explicit burst capacity.
    pub fn set_rate_limit_with_burst(
        &self,
        task_type: impl Into<String>,
        tokens_per_second: f64,
        burst: u32,
    ) {
        self.shared.limiter.set_limit_with_burst(task_type, tokens_per_second, burst);
    }

    pub fn clear_rate_limit(&self, task_type: &str) {
        self.shared.limiter.clear_limit(task_type);
    }

    /// Apply a table of `task_type -> tokens_per_second` limits.
    pub fn apply_rate_limits(&self, limits: &HashMap<String, f64>) {
        for (task_type, rate) in limits {
            self.shared.limiter.set_limit(task_type.clone(), *rate);
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn stats_collector(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.shared.stats)
    }

    /// Entries waiting to run, including delayed retries.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// True once [`Scheduler::start`] has launched the workers.
    pub fn is_started(&self) -> bool {
        self.pool.is_started()
    }

    /// Workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.pool.live_workers()
    }

    pub fn is_accepting(&self) -> bool {
        self.coordinator.is_accepting()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.coordinator.state()
    }

    /// Stop the scheduler.
    ///
    /// Queued work keeps draining until `deadline`. If it has not finished
    /// by then, in-flight attempts are cancelled and fail with
    /// [`TaskError::Cancelled`]; entries that never ran fail with
    /// [`TaskError::Shutdown`]. Safe to call concurrently: every caller
    /// observes the outcome of the first.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownResult {
        self.coordinator.initiate(|| self.stop(deadline)).await
    }

    /// [`Scheduler::shutdown`] with the configured `shutdown_timeout`.
    pub async fn shutdown_default(&self) -> ShutdownResult {
        self.shutdown(self.shutdown_timeout).await
    }

    async fn stop(&self, grace: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + grace;
        tracing::info!(grace_ms = grace.as_millis() as u64, "shutdown initiated; draining");
        self.shared.queue.close();

        let result = if self.pool.join_until(deadline).await {
            ShutdownResult::Complete
        } else {
            let remaining = u32::try_from(self.shared.stats.snapshot().running).unwrap_or(u32::MAX);
            tracing::warn!(remaining, "shutdown deadline reached; cancelling in-flight tasks");
            self.shared.hard_stop.cancel();
            let grace_end = tokio::time::Instant::now() + HARD_STOP_GRACE;
            if !self.pool.join_until(grace_end).await {
                tracing::warn!("aborting workers that ignored cancellation");
                self.pool.abort_all();
                self.pool.join_until(tokio::time::Instant::now() + HARD_STOP_GRACE).await;
            }
            ShutdownResult::Timeout { remaining }
        };

        self.shared.hard_stop.cancel();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }
        self.fail_undispatched();

        tracing::info!(?result, "shutdown complete");
        result
    }

    /// Publish a shutdown failure for every entry that never ran.
    fn fail_undispatched(&self) {
        let mut pending = self.shared.delay.drain();
        pending.extend(self.shared.queue.drain_ready());
        if !pending.is_empty() {
            tracing::warn!(count = pending.len(), "failing tasks that were never dispatched");
        }
        for entry in pending {
            let result = TaskResult::failed(
                entry.task.id(),
                TaskError::Shutdown,
                entry.retries,
                Duration::ZERO,
            );
            self.shared.stats.record_finished(false);
            telemetry::record_task_failed(entry.task.task_type(), "shutdown");
            self.shared.registry.publish(entry.task.id(), result);
        }
    }
}

impl Drop for Scheduler {
    /// Dropping without [`Scheduler::shutdown`] stops everything at once.
    /// Queued entries fail with [`TaskError::Shutdown`] and attempts cut
    /// short fail with [`TaskError::Cancelled`], so no handle waits forever.
    fn drop(&mut self) {
        self.shared.hard_stop.cancel();
        self.shared.queue.close();
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
        self.pool.abort_all();

        self.fail_undispatched();
        let interrupted = self.shared.registry.fail_all(TaskError::Cancelled);
        if interrupted > 0 {
            tracing::warn!(count = interrupted, "scheduler dropped with tasks in flight");
            for _ in 0..interrupted {
                self.shared.stats.record_finished(false);
            }
        }
    }
}
