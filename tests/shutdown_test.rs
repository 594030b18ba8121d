//! Tests for graceful and hard-deadline shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gg_sched::shutdown::ShutdownCoordinator;
use gg_sched::{
    Scheduler, SchedulerConfig, SchedulerError, ShutdownResult, ShutdownState, Task, TaskError,
};

fn sleeping_task(id: String, nap: Duration) -> Task {
    Task::from_fn(id, "sleep", move |_ctx| async move {
        tokio::time::sleep(nap).await;
        Ok(())
    })
}

#[tokio::test]
async fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);
    assert!(coordinator.is_accepting());
    assert!(coordinator.outcome().is_none());
}

#[tokio::test]
async fn test_initiate_transitions_to_draining() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let coord_clone = coordinator.clone();

    let handle = tokio::spawn(async move {
        coord_clone
            .initiate(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ShutdownResult::Complete
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(coordinator.state(), ShutdownState::Draining);
    assert!(!coordinator.is_accepting());

    assert_eq!(handle.await.unwrap(), ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_stop_sequence_runs_once() {
    let coordinator = ShutdownCoordinator::new();
    let first = coordinator
        .initiate(|| async { ShutdownResult::Timeout { remaining: 2 } })
        .await;
    let second = coordinator.initiate(|| async { ShutdownResult::Complete }).await;

    assert_eq!(first, ShutdownResult::Timeout { remaining: 2 });
    assert_eq!(second, first);
    assert_eq!(coordinator.outcome(), Some(first));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graceful_shutdown_drains_queued_work() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(5));
    scheduler.start().unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let task = sleeping_task(format!("nap-{i}"), Duration::from_millis(200));
        handles.push(scheduler.submit(task).await.unwrap().0);
    }

    let start = Instant::now();
    let result = scheduler.shutdown(Duration::from_secs(5)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());

    for h in &handles {
        let r = h.try_result().expect("every task has a result after shutdown");
        assert!(r.success);
    }
    let stats = scheduler.stats();
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.running, 0);
    assert_eq!(scheduler.live_workers(), 0);
    assert_eq!(scheduler.shutdown_state(), ShutdownState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hard_deadline_cancels_in_flight_tasks() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(2));
    scheduler.start().unwrap();

    let mut running = Vec::new();
    for i in 0..2 {
        let task = sleeping_task(format!("long-{i}"), Duration::from_secs(10)).with_max_retries(3);
        running.push(scheduler.submit(task).await.unwrap().0);
    }
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.stats().running < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut queued = Vec::new();
    for i in 0..3 {
        let task = sleeping_task(format!("queued-{i}"), Duration::from_secs(10));
        queued.push(scheduler.submit(task).await.unwrap().0);
    }

    let start = Instant::now();
    let result = scheduler.shutdown(Duration::from_millis(100)).await;
    let elapsed = start.elapsed();

    assert_eq!(result, ShutdownResult::Timeout { remaining: 2 });
    assert!(elapsed < Duration::from_millis(400), "hard stop took {elapsed:?}");

    for h in &running {
        let r = h.try_result().unwrap();
        assert_eq!(r.error, Some(TaskError::Cancelled));
        assert_eq!(r.attempts, 1, "cancelled attempts are not retried");
    }
    for h in &queued {
        let r = h.try_result().unwrap();
        assert_eq!(r.error, Some(TaskError::Shutdown));
    }

    let stats = scheduler.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.failed, 5);
    assert_eq!(scheduler.live_workers(), 0);
}

#[tokio::test]
async fn test_cooperative_task_observes_cancellation() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.start().unwrap();

    let task = Task::from_fn("polite", "t", |ctx| async move {
        ctx.cancelled().await;
        Err(TaskError::Cancelled)
    });
    let (result, _) = scheduler.submit(task).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let start = Instant::now();
    let outcome = scheduler.shutdown(Duration::from_millis(50)).await;
    assert_eq!(outcome, ShutdownResult::Timeout { remaining: 1 });
    assert!(start.elapsed() < Duration::from_millis(300));
    assert_eq!(result.try_result().unwrap().error, Some(TaskError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shutdown_callers_share_outcome() {
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default().with_workers(2)));
    scheduler.start().unwrap();
    scheduler
        .submit(sleeping_task("brief".into(), Duration::from_millis(50)))
        .await
        .unwrap();

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.shutdown(Duration::from_secs(2)).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for c in callers {
        outcomes.push(c.await.unwrap());
    }
    assert!(outcomes.iter().all(|o| *o == ShutdownResult::Complete));
    assert_eq!(scheduler.live_workers(), 0);
}

#[tokio::test]
async fn test_dropping_scheduler_resolves_pending_handles() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.start().unwrap();

    let (busy, _) = scheduler
        .submit(sleeping_task("busy".into(), Duration::from_secs(10)))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.stats().running < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let (queued, _) = scheduler
        .submit(sleeping_task("queued".into(), Duration::ZERO))
        .await
        .unwrap();

    let stats = scheduler.stats_collector();
    drop(scheduler);

    let queued = tokio::time::timeout(Duration::from_secs(2), queued.wait())
        .await
        .expect("queued handle left waiting after drop");
    assert_eq!(queued.error, Some(TaskError::Shutdown));
    let busy = tokio::time::timeout(Duration::from_secs(2), busy.wait())
        .await
        .expect("running handle left waiting after drop");
    assert_eq!(busy.error, Some(TaskError::Cancelled));
    assert_eq!(stats.snapshot().failed, 2);
}

#[tokio::test]
async fn test_submit_rejected_once_draining() {
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default().with_workers(1)));
    scheduler.start().unwrap();
    scheduler
        .submit(sleeping_task("slow".into(), Duration::from_millis(200)))
        .await
        .unwrap();

    let stopper = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.shutdown(Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!scheduler.is_accepting());
    let err = scheduler
        .submit(sleeping_task("late".into(), Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err, SchedulerError::ShuttingDown);
    assert_eq!(stopper.await.unwrap(), ShutdownResult::Complete);
}
