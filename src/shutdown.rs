//! Shutdown coordination for the scheduler.
//!
//! Provides a state machine for clean termination. The first caller runs
//! the stop sequence; concurrent and later callers wait for and observe
//! the same outcome.

use std::future::Future;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownResult {
    /// Every queued and in-flight task finished before the deadline.
    Complete,
    /// The deadline passed; `remaining` attempts were cancelled.
    Timeout { remaining: u32 },
}

/// Runs a stop sequence at most once.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    outcome: OnceCell<ShutdownResult>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            outcome: OnceCell::new(),
        }
    }

    /// Get current shutdown state.
    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if accepting new work.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Outcome of a completed shutdown, if any.
    pub fn outcome(&self) -> Option<ShutdownResult> {
        self.outcome.get().cloned()
    }

    /// Initiate shutdown: stop accepting, then run `stop` once.
    pub async fn initiate<F, Fut>(&self, stop: F) -> ShutdownResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ShutdownResult>,
    {
        let outcome = self
            .outcome
            .get_or_init(|| async move {
                *self.state.write() = ShutdownState::Draining;
                let result = stop().await;
                *self.state.write() = ShutdownState::Stopped;
                result
            })
            .await;
        outcome.clone()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
