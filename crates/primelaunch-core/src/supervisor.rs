//! Supervised background tasks.
//!
//! Entity initialization and corruption watches run detached from whoever
//! started them, but never unmanaged:
//! - every task is tracked until it finishes
//! - failures and panics are reported to the exception channel
//! - [`TaskSupervisor::shutdown`] cancels everything still running

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::events::EventBus;

/// Failure of the task itself rather than of its work.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Background task '{0}' panicked")]
    Panicked(String),
}

/// Task state for tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Task metadata for observability.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub name: String,
    pub state: TaskState,
    pub spawned_at: DateTime<Utc>,
}

/// Metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorMetrics {
    pub total_spawned: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    pub active_tasks: usize,
}

struct SupervisorInner {
    tracker: TaskTracker,
    token: CancellationToken,
    bus: EventBus,
    tasks: DashMap<Uuid, TaskInfo>,
    total_spawned: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_cancelled: AtomicU64,
}

impl SupervisorInner {
    fn register(&self, info: TaskInfo) {
        self.tasks.insert(info.id, info);
        self.total_spawned.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, id: Uuid, state: TaskState) {
        let counter = match state {
            TaskState::Completed => &self.total_completed,
            TaskState::Failed => &self.total_failed,
            TaskState::Cancelled => &self.total_cancelled,
            TaskState::Running => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.tasks.remove(&id);
    }
}

/// Spawns and tracks background work.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<SupervisorInner>,
}

impl TaskSupervisor {
    /// Create a supervisor that reports failures to `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                tracker: TaskTracker::new(),
                token: CancellationToken::new(),
                bus,
                tasks: DashMap::new(),
                total_spawned: AtomicU64::new(0),
                total_completed: AtomicU64::new(0),
                total_failed: AtomicU64::new(0),
                total_cancelled: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn a supervised task.
    ///
    /// The caller gets no handle to await; the outcome is only visible
    /// through the exception channel and [`metrics`](Self::metrics).
    pub fn spawn<F, E>(&self, name: impl Into<String>, future: F) -> Uuid
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let task_id = Uuid::new_v4();
        let task_name = name.into();

        self.inner.register(TaskInfo {
            id: task_id,
            name: task_name.clone(),
            state: TaskState::Running,
            spawned_at: Utc::now(),
        });

        let span = tracing::info_span!(
            "supervised_task",
            task_id = %task_id,
            task_name = %task_name,
        );

        debug!(task_id = %task_id, task_name = %task_name, "Spawning task");

        let mut work = tokio::spawn(future.instrument(span));
        let inner = Arc::clone(&self.inner);
        let token = self.inner.token.clone();

        self.inner.tracker.spawn(async move {
            let outcome = tokio::select! {
                outcome = &mut work => outcome,
                _ = token.cancelled() => {
                    work.abort();
                    inner.finish(task_id, TaskState::Cancelled);
                    return;
                }
            };

            match outcome {
                Ok(Ok(())) => inner.finish(task_id, TaskState::Completed),
                Ok(Err(err)) => {
                    warn!(task_name = %task_name, error = %err, "Background task failed");
                    inner.finish(task_id, TaskState::Failed);
                    inner
                        .bus
                        .publish_exception(format!("Background task '{}' failed", task_name), err);
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(task_name = %task_name, "Background task panicked");
                    inner.finish(task_id, TaskState::Failed);
                    inner.bus.publish_exception(
                        "Sorry, an error occurred",
                        SupervisorError::Panicked(task_name),
                    );
                }
                Err(_) => inner.finish(task_id, TaskState::Cancelled),
            }
        });

        task_id
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Wait until every task spawned so far has finished, without
    /// cancelling anything.
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Cancel every running task and wait for them to wind down.
    pub async fn shutdown(&self) {
        let active = self.inner.tasks.len();
        self.inner.token.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(cancelled = active, "Task supervisor stopped");
    }

    /// Get current metrics.
    pub fn metrics(&self) -> SupervisorMetrics {
        SupervisorMetrics {
            total_spawned: self.inner.total_spawned.load(Ordering::SeqCst),
            total_completed: self.inner.total_completed.load(Ordering::SeqCst),
            total_failed: self.inner.total_failed.load(Ordering::SeqCst),
            total_cancelled: self.inner.total_cancelled.load(Ordering::SeqCst),
            active_tasks: self.inner.tasks.len(),
        }
    }

    /// Get list of active tasks.
    pub fn active_tasks(&self) -> Vec<TaskInfo> {
        self.inner
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
