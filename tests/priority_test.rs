//! Tests for priority ordering of dispatch.

use std::sync::Arc;
use std::time::Duration;

use gg_sched::{Scheduler, SchedulerConfig, Task, TaskPriority};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

fn recording_task(id: String, priority: TaskPriority, order: Arc<Mutex<Vec<String>>>) -> Task {
    let label = id.clone();
    Task::from_fn(id, "record", move |_ctx| {
        let order = order.clone();
        let label = label.clone();
        async move {
            order.lock().push(label);
            Ok(())
        }
    })
    .with_priority(priority)
}

/// Occupy the single worker until the gate opens.
async fn block_worker(scheduler: &Scheduler, gate: Arc<Semaphore>) {
    scheduler
        .submit(Task::from_fn("blocker", "block", move |_ctx| {
            let gate = gate.clone();
            async move {
                let _permit = gate.acquire().await;
                Ok(())
            }
        }))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.stats().running == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_high_priority_runs_before_low() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.start().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    block_worker(&scheduler, gate.clone()).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5 {
        let low = recording_task(format!("low-{i}"), TaskPriority::Low, order.clone());
        let high = recording_task(format!("high-{i}"), TaskPriority::High, order.clone());
        handles.push(scheduler.submit(low).await.unwrap().0);
        handles.push(scheduler.submit(high).await.unwrap().0);
    }

    gate.add_permits(1);
    for h in &handles {
        assert!(h.wait().await.success);
    }

    let order = order.lock().clone();
    assert_eq!(order.len(), 10);
    let first_low = order.iter().position(|l| l.starts_with("low")).unwrap();
    let last_high = order.iter().rposition(|l| l.starts_with("high")).unwrap();
    assert!(last_high < first_low, "order was {order:?}");

    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_equal_priority_is_fifo() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.start().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    block_worker(&scheduler, gate.clone()).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..8 {
        let task = recording_task(format!("m-{i}"), TaskPriority::Medium, order.clone());
        handles.push(scheduler.submit(task).await.unwrap().0);
    }

    gate.add_permits(1);
    for h in &handles {
        h.wait().await;
    }

    let expected: Vec<String> = (0..8).map(|i| format!("m-{i}")).collect();
    assert_eq!(*order.lock(), expected);
    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_three_levels_dispatch_in_rank_order() {
    let scheduler = Scheduler::new(SchedulerConfig::default().with_workers(1));
    scheduler.start().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    block_worker(&scheduler, gate.clone()).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (id, priority) in [
        ("low", TaskPriority::Low),
        ("medium", TaskPriority::Medium),
        ("high", TaskPriority::High),
    ] {
        let task = recording_task(id.to_string(), priority, order.clone());
        handles.push(scheduler.submit(task).await.unwrap().0);
    }

    gate.add_permits(1);
    for h in &handles {
        h.wait().await;
    }

    assert_eq!(*order.lock(), vec!["high", "medium", "low"]);
    scheduler.shutdown(Duration::from_secs(1)).await;
}

#[test]
fn test_priority_from_numeric_rank() {
    assert_eq!(TaskPriority::from(0), TaskPriority::High);
    assert_eq!(TaskPriority::from(1), TaskPriority::Medium);
    assert_eq!(TaskPriority::from(2), TaskPriority::Low);
    assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    assert!(TaskPriority::High < TaskPriority::Low);
}
