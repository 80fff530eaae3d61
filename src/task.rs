//! Cooperative cancellation of long-running index tasks.
//!
//! Sampling and deferred verification register a [`TaskControl`] with the
//! index's [`TaskCoordinator`] and poll it between steps. Dropping the index
//! cancels the coordinator and waits until every control has been released,
//! so no task is still reading partition files when they are deleted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Waiting for outstanding tasks gave up before they completed.
#[derive(Debug, Error)]
#[error(
    "Interrupted while waiting for concurrent tasks to complete: {outstanding} still running after {waited:?}"
)]
/// Waiting for tasks gave up before all of them completed.
pub struct AwaitInterrupted {
    pub outstanding: usize,
    pub waited: Duration,
}

#[derive(Debug)]
struct CoordinatorState {
    cancelled: AtomicBool,
    outstanding: Mutex<usize>,
    completed: Condvar,
    poll_interval: Duration,
}

/// Tracks outstanding task controls and cancels them on demand.
#[derive(Debug, Clone)]
pub struct TaskCoordinator {
    state: Arc<CoordinatorState>,
}

impl TaskCoordinator {
    /// Coordinator re-checking outstanding tasks every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        TaskCoordinator {
            state: Arc::new(CoordinatorState {
                cancelled: AtomicBool::new(false),
                outstanding: Mutex::new(0),
                completed: Condvar::new(),
                poll_interval,
            }),
        }
    }

    /// Register a new task. While the coordinator is cancelled, new controls
    /// start out cancelled.
    pub fn new_instance(&self) -> TaskControl {
        *self.state.outstanding.lock() += 1;
        TaskControl {
            state: self.state.clone(),
            completed: false,
        }
    }

    /// Cancel every current and future task until [`TaskCoordinator::reset`].
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Lift a previous cancellation.
    pub fn reset(&self) {
        self.state.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Number of registered controls not yet completed.
    pub fn outstanding(&self) -> usize {
        *self.state.outstanding.lock()
    }

    /// Block until every registered control completed, or `timeout` elapsed.
    ///
    /// Rechecks at least once per poll interval.
    pub fn await_completion(
        &self,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), AwaitInterrupted> {
        let started = Instant::now();
        let mut outstanding = self.state.outstanding.lock();
        while *outstanding > 0 {
            let wait = match timeout {
                Some(limit) => {
                    let waited = started.elapsed();
                    if waited >= limit {
                        return Err(AwaitInterrupted {
                            outstanding: *outstanding,
                            waited,
                        });
                    }
                    (limit - waited).min(self.state.poll_interval)
                }
                None => self.state.poll_interval,
            };
            self.state.completed.wait_for(&mut outstanding, wait);
        }
        Ok(())
    }
}

/// Handle of one running task.
///
/// The task is reported complete on [`TaskControl::close`] or drop.
#[derive(Debug)]
pub struct TaskControl {
    state: Arc<CoordinatorState>,
    completed: bool,
}

impl TaskControl {
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Mark the task complete.
    pub fn close(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let mut outstanding = self.state.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.state.completed.notify_all();
        }
    }
}

impl Drop for TaskControl {
    fn drop(&mut self) {
        self.complete();
    }
}
