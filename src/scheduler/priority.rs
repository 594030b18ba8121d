//! Task prioritization and queue entry ordering.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::heap::HeapOrder;
use super::task::{ProgressSink, Task};

/// Priority level for tasks. Smaller is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl From<u8> for TaskPriority {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::High,
            1 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Scheduler-internal wrapper around a submitted task.
///
/// Only `retries` and `ready_at` change while the entry cycles through the
/// queues; the sequence is assigned once at submission.
#[derive(Debug)]
pub struct QueueEntry {
    pub task: Arc<Task>,
    pub sequence: u64,
    pub ready_at: Instant,
    pub retries: u32,
    pub submitted_at: Instant,
    pub(crate) progress: ProgressSink,
}

impl QueueEntry {
    pub(crate) fn new(task: Task, sequence: u64, progress: ProgressSink) -> Self {
        let now = Instant::now();
        Self {
            task: Arc::new(task),
            sequence,
            ready_at: now,
            retries: 0,
            submitted_at: now,
            progress,
        }
    }

    pub fn priority(&self) -> TaskPriority {
        self.task.priority()
    }
}

impl HeapOrder for QueueEntry {
    fn precedes(&self, other: &Self) -> bool {
        (self.priority(), self.sequence) < (other.priority(), other.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::heap::Heap;
    use tokio::sync::mpsc;

    fn entry(id: &str, priority: TaskPriority, sequence: u64) -> QueueEntry {
        let (tx, _rx) = mpsc::channel(1);
        let task = Task::from_fn(id, "t", |_ctx| async { Ok(()) }).with_priority(priority);
        QueueEntry::new(task, sequence, ProgressSink::new(tx))
    }

    #[test]
    fn priority_ordering_is_high_first() {
        assert!(TaskPriority::High < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::Low);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
        assert_eq!(TaskPriority::from(0), TaskPriority::High);
        assert_eq!(TaskPriority::from(7), TaskPriority::Low);
    }

    #[test]
    fn entries_order_by_priority_then_sequence() {
        let mut heap = Heap::new();
        heap.push(entry("low-0", TaskPriority::Low, 0));
        heap.push(entry("high-1", TaskPriority::High, 1));
        heap.push(entry("med-2", TaskPriority::Medium, 2));
        heap.push(entry("high-3", TaskPriority::High, 3));

        let order: Vec<String> =
            std::iter::from_fn(|| heap.pop()).map(|e| e.task.id().to_string()).collect();
        assert_eq!(order, vec!["high-1", "high-3", "med-2", "low-0"]);
    }
}
