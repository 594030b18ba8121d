//! Metrics facade hooks for scheduler events.
//!
//! Only the `metrics` facade is used; installing an exporter is up to the
//! hosting process. Without one, these calls are no-ops.

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};

pub fn record_task_submitted(task_type: &str) {
    counter!("gg_sched_tasks_submitted_total", "task_type" => task_type.to_string()).increment(1);
}

pub fn record_task_completed(task_type: &str, latency: Duration) {
    counter!("gg_sched_tasks_completed_total", "task_type" => task_type.to_string()).increment(1);
    histogram!("gg_sched_task_duration_seconds", "task_type" => task_type.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_task_failed(task_type: &str, reason: &'static str) {
    counter!(
        "gg_sched_tasks_failed_total",
        "task_type" => task_type.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_task_retry(task_type: &str) {
    counter!("gg_sched_task_retries_total", "task_type" => task_type.to_string()).increment(1);
}

pub fn record_rate_limited(task_type: &str) {
    counter!("gg_sched_rate_limited_total", "task_type" => task_type.to_string()).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("gg_sched_queue_depth").set(depth as f64);
}
