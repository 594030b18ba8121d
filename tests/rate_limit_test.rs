//! Tests for per-type rate limiting.

use std::time::{Duration, Instant};

use gg_sched::scheduler::RateLimiter;
use gg_sched::{ResultHandle, Scheduler, SchedulerConfig, Task};

async fn submit_noops(scheduler: &Scheduler, prefix: &str, task_type: &str, n: usize) -> Vec<ResultHandle> {
    let mut handles = Vec::with_capacity(n);
    for i in 0..n {
        let task = Task::from_fn(format!("{prefix}-{i}"), task_type, |_ctx| async { Ok(()) });
        handles.push(scheduler.submit(task).await.unwrap().0);
    }
    handles
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limited_type_is_throttled() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(4));
    scheduler.set_rate_limit("email", 5.0);
    scheduler.start().unwrap();

    let start = Instant::now();
    let handles = submit_noops(&scheduler, "mail", "email", 15).await;
    for h in &handles {
        let r = tokio::time::timeout(Duration::from_secs(10), h.wait()).await.unwrap();
        assert!(r.success, "throttled tasks must not fail");
    }
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(2500), "finished too fast: {elapsed:?}");
    assert!(scheduler.stats().deferred > 0);
    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unlimited_type_is_not_delayed() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(4));
    scheduler.set_rate_limit("email", 1.0);
    scheduler.start().unwrap();

    let throttled = submit_noops(&scheduler, "mail", "email", 5).await;
    let start = Instant::now();
    let free = submit_noops(&scheduler, "sms", "sms", 20).await;
    for h in &free {
        assert!(h.wait().await.success);
    }
    assert!(start.elapsed() < Duration::from_secs(1), "unlimited type was throttled");
    assert!(throttled.iter().any(|h| !h.is_finished()));

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_burst_allows_immediate_dispatch() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(2));
    scheduler.set_rate_limit_with_burst("bulk", 1.0, 5);
    scheduler.start().unwrap();

    let start = Instant::now();
    let handles = submit_noops(&scheduler, "b", "bulk", 5).await;
    for h in &handles {
        assert!(h.wait().await.success);
    }
    assert!(start.elapsed() < Duration::from_millis(500));
    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_cleared_limit_stops_throttling() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(2));
    scheduler.set_rate_limit("email", 0.5);
    scheduler.clear_rate_limit("email");
    scheduler.start().unwrap();

    let start = Instant::now();
    let handles = submit_noops(&scheduler, "m", "email", 10).await;
    for h in &handles {
        h.wait().await;
    }
    assert!(start.elapsed() < Duration::from_millis(500));
    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_vanishing_rate_keeps_worker_alive() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.set_rate_limit("slow", 1e-25);
    scheduler.start().unwrap();

    let slow = submit_noops(&scheduler, "slow", "slow", 2).await;
    assert!(tokio::time::timeout(Duration::from_secs(2), slow[0].wait())
        .await
        .unwrap()
        .success);

    let free = submit_noops(&scheduler, "free", "free", 1).await;
    let r = tokio::time::timeout(Duration::from_secs(2), free[0].wait())
        .await
        .expect("worker stopped dispatching");
    assert!(r.success);
    assert!(!slow[1].is_finished());
    assert_eq!(scheduler.live_workers(), 1);
    assert!(scheduler.stats().deferred > 0);

    scheduler.shutdown(Duration::from_millis(100)).await;
    assert_eq!(slow[1].try_result().unwrap().error, Some(gg_sched::TaskError::Shutdown));
}

#[test]
fn test_limiter_reports_wait_time() {
    let limiter = RateLimiter::new();
    assert!(limiter.allow("anything"));
    assert_eq!(limiter.wait_time("anything"), Duration::ZERO);

    limiter.set_limit("email", 2.0);
    assert_eq!(limiter.limit("email"), Some(2.0));
    assert!(limiter.allow("email"));
    assert!(!limiter.allow("email"));
    let wait = limiter.wait_time("email");
    assert!(wait > Duration::ZERO && wait <= Duration::from_millis(500));
}
