//! Worker loop: dequeue ready entries and execute them.
//!
//! Each handler runs in its own spawned task so a panic is caught at the
//! join boundary and a timed-out or cancelled attempt can be aborted
//! without taking the worker down with it.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::core::Shared;
use super::priority::QueueEntry;
use super::retry::RetryDecision;
use super::task::{Task, TaskContext, TaskError, TaskResult};
use crate::telemetry::{self, SpanExt, TaskSpan};

/// Shortest delay applied to a rate-limited entry.
const MIN_DEFERRAL: Duration = Duration::from_millis(5);

/// Spawn one worker loop. Returns a handle for shutdown.
pub(crate) fn spawn_worker(worker_id: usize, shared: Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        worker_loop(worker_id, &shared).await;
    })
}

async fn worker_loop(worker_id: usize, shared: &Shared) {
    tracing::debug!(worker_id, "worker started");
    loop {
        let entry = tokio::select! {
            biased;
            () = shared.hard_stop.cancelled() => break,
            next = shared.queue.wait_and_pop() => match next {
                Some(entry) => entry,
                None => break,
            },
        };
        dispatch(worker_id, shared, entry).await;
    }
    tracing::debug!(worker_id, "worker exited");
}

/// Admit an entry through the rate limiter, or defer it.
async fn dispatch(worker_id: usize, shared: &Shared, entry: QueueEntry) {
    let task = Arc::clone(&entry.task);
    if !shared.limiter.allow(task.task_type()) {
        let wait = shared.limiter.wait_time(task.task_type()).max(MIN_DEFERRAL);
        tracing::trace!(
            task_id = task.id(),
            task_type = task.task_type(),
            wait_ms = wait.as_millis() as u64,
            "rate limited; deferring"
        );
        shared.stats.record_deferred();
        telemetry::record_rate_limited(task.task_type());
        shared.delay.schedule(entry, wait);
        return;
    }
    execute_entry(worker_id, shared, entry).await;
}

async fn execute_entry(worker_id: usize, shared: &Shared, mut entry: QueueEntry) {
    let task = Arc::clone(&entry.task);
    let attempt = entry.retries + 1;
    let span = TaskSpan::new(task.id(), task.task_type(), attempt, worker_id);
    let cancel = shared.hard_stop.child_token();
    let ctx = TaskContext::new(task.shared_id(), attempt, cancel.clone(), entry.progress.clone());

    let running = shared.stats.track_running();
    let started = Instant::now();
    let outcome = run_attempt(&task, ctx, &cancel).instrument(span.clone()).await;
    let elapsed = started.elapsed();
    drop(running);

    span.record("latency_ms", elapsed.as_millis() as u64);
    span.record_result(&outcome);

    let error = match outcome {
        Ok(()) => {
            tracing::debug!(parent: &span, "task completed");
            telemetry::record_task_completed(task.task_type(), elapsed);
            finish(shared, &task, TaskResult::completed(task.id(), attempt, elapsed));
            return;
        }
        Err(error) => error,
    };

    let decision = if shared.hard_stop.is_cancelled() {
        RetryDecision::GiveUp
    } else {
        shared.retry.decide(&error, entry.retries, task.max_retries())
    };

    match decision {
        RetryDecision::Retry { retry, delay } => {
            tracing::warn!(
                parent: &span,
                error = %error,
                retry,
                delay_ms = delay.as_millis() as u64,
                "attempt failed; scheduling retry"
            );
            shared.stats.record_retry();
            telemetry::record_task_retry(task.task_type());
            entry.retries = retry;
            shared.delay.schedule(entry, delay);
        }
        RetryDecision::GiveUp => {
            tracing::warn!(parent: &span, error = %error, attempts = attempt, "task failed");
            telemetry::record_task_failed(task.task_type(), failure_reason(&error));
            finish(shared, &task, TaskResult::failed(task.id(), error, attempt, elapsed));
        }
    }
}

/// Run one attempt under the task's timeout and the cancellation token.
async fn run_attempt(
    task: &Task,
    ctx: TaskContext,
    cancel: &CancellationToken,
) -> Result<(), TaskError> {
    let handler = task.handler();
    let mut execution = tokio::spawn(async move { handler.run(ctx).await });

    let timeout = task.timeout();
    let expired = async move {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        joined = &mut execution => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(TaskError::Cancelled),
        },
        limit = expired => {
            cancel.cancel();
            execution.abort();
            Err(TaskError::TimedOut(limit))
        }
        () = cancel.cancelled() => {
            execution.abort();
            Err(TaskError::Cancelled)
        }
    }
}

fn finish(shared: &Shared, task: &Task, result: TaskResult) {
    shared.stats.record_finished(result.success);
    shared.registry.publish(task.id(), result);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn failure_reason(error: &TaskError) -> &'static str {
    match error {
        TaskError::Failed(_) => "error",
        TaskError::TimedOut(_) => "timeout",
        TaskError::Panicked(_) => "panic",
        TaskError::Cancelled => "cancelled",
        TaskError::Shutdown => "shutdown",
        TaskError::Rejected(_) => "rejected",
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
