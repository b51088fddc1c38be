//! Task runner - main poll loop over the shared task list

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{Result, SplatError};
use crate::hub::RemoteStore;
use crate::tasks::{Task, TaskStatus};
use crate::worker::{TaskProcessor, WorkerConfig};

/// What one poll cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Tasks that went `processing` -> `ready`
    pub succeeded: usize,
    /// Tasks that failed and were left for the next cycle
    pub failed: usize,
    /// Whether the updated list was written back to the hub
    pub committed: bool,
}

/// Task runner that polls the shared task list and processes pending work
pub struct TaskRunner {
    store: Arc<dyn RemoteStore>,
    config: WorkerConfig,
    processor: TaskProcessor,
    shutdown: Arc<AtomicBool>,
}

impl TaskRunner {
    /// Create a new task runner
    pub fn new(store: Arc<dyn RemoteStore>, config: WorkerConfig, processor: TaskProcessor) -> Self {
        Self {
            store,
            config,
            processor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Main poll loop
    ///
    /// Fetches the task list on a fixed interval and processes every task in
    /// `processing` state until shutdown is signaled. Cycle-level errors are
    /// logged and never kill the process.
    pub async fn run(&self) -> Result<()> {
        info!("Starting splat-node worker...");
        info!("Poll interval: {:?}", self.config.poll_interval);
        info!("Reconstruction timeout: {:?}", self.config.task_timeout);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping worker...");
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.succeeded + report.failed > 0 => {
                    info!(
                        "Cycle done: {} succeeded, {} failed, write-back: {}",
                        report.succeeded, report.failed, report.committed
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Poll cycle error: {}", e);
                }
            }

            sleep(self.config.poll_interval).await;
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Run exactly one poll cycle (used by the `--once` flag and tests)
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        // An unreadable or unparsable list is a recoverable condition: the
        // document may simply not exist yet.
        let list = match self.store.fetch_task_list().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Could not read task list (may not exist yet): {}", e);
                return Ok(CycleReport::default());
            }
        };

        let revision = list.revision.clone();
        let mut tasks = list.tasks;
        let mut report = CycleReport::default();
        let mut updated_ids = Vec::new();

        for task in tasks.iter_mut() {
            if task.status != TaskStatus::Processing {
                continue;
            }

            match self.processor.process(task).await {
                Ok(splat_path) => {
                    task.status = TaskStatus::Ready;
                    task.splat_path = Some(splat_path);
                    updated_ids.push(task.id.clone());
                    report.succeeded += 1;
                }
                Err(e) => {
                    error!("Task {} failed: {}", task.id, e);
                    report.failed += 1;
                    if record_failure(task, &e, self.config.max_attempts) {
                        updated_ids.push(task.id.clone());
                    }
                }
            }
        }

        if !updated_ids.is_empty() {
            info!("Updating task statuses on the hub...");
            self.commit(&tasks, revision.as_deref(), &updated_ids).await?;
            report.committed = true;
        }

        Ok(report)
    }

    /// Write the full list back, detecting concurrent producer writes.
    ///
    /// On a revision conflict the latest document is re-fetched, this cycle's
    /// updates are merged in by task id, and the write is retried once
    /// against the new revision. A second conflict fails the cycle; the next
    /// poll re-fetches and is the retry mechanism.
    async fn commit(
        &self,
        tasks: &[Task],
        revision: Option<&str>,
        updated_ids: &[crate::tasks::TaskId],
    ) -> Result<()> {
        match self.store.put_task_list(tasks, revision).await {
            Ok(()) => Ok(()),
            Err(SplatError::TaskListConflict { expected }) => {
                warn!(
                    "Task list moved past revision {} during this cycle; merging and retrying",
                    expected
                );
                let latest = self.store.fetch_task_list().await?;
                let merged = merge_updates(latest.tasks, tasks, updated_ids);
                self.store
                    .put_task_list(&merged, latest.revision.as_deref())
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

/// Record a failure on the task record when failure tracking is enabled.
///
/// Returns true if the record was mutated and must be written back.
fn record_failure(task: &mut Task, err: &SplatError, max_attempts: Option<u32>) -> bool {
    let Some(max) = max_attempts else {
        return false;
    };

    let attempts = task.retry_count.unwrap_or(0) + 1;
    task.retry_count = Some(attempts);
    task.failure_reason = Some(err.to_string());

    if attempts >= max {
        warn!(
            "Task {} failed {} times, marking as failed",
            task.id, attempts
        );
        task.status = TaskStatus::Failed;
    }

    true
}

/// Apply this cycle's task updates onto a freshly fetched list.
///
/// Entries the producer added or changed concurrently are kept from
/// `latest`; only the tasks this cycle actually updated are taken from
/// `ours`. A task we updated that no longer exists remotely is dropped with
/// a warning (its artifact stays uploaded).
fn merge_updates(latest: Vec<Task>, ours: &[Task], updated_ids: &[crate::tasks::TaskId]) -> Vec<Task> {
    for id in updated_ids {
        if !latest.iter().any(|t| &t.id == id) {
            warn!("Task {} no longer exists remotely; dropping its update", id);
        }
    }

    latest
        .into_iter()
        .map(|task| {
            if updated_ids.contains(&task.id) {
                if let Some(updated) = ours.iter().find(|t| t.id == task.id) {
                    return updated.clone();
                }
            }
            task
        })
        .collect()
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskId;

    fn task(id: i64, status: TaskStatus) -> Task {
        Task {
            id: TaskId::Int(id),
            photo_path: format!("inputs/{id}.jpg"),
            status,
            splat_path: None,
            failure_reason: None,
            retry_count: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn record_failure_is_noop_without_max_attempts() {
        let mut t = task(1, TaskStatus::Processing);
        let err = SplatError::ToolFailed {
            code: 1,
            stderr: String::new(),
        };

        assert!(!record_failure(&mut t, &err, None));
        assert_eq!(t, task(1, TaskStatus::Processing));
    }

    #[test]
    fn record_failure_counts_attempts_then_fails_task() {
        let mut t = task(1, TaskStatus::Processing);
        let err = SplatError::ToolFailed {
            code: 1,
            stderr: "boom".into(),
        };

        assert!(record_failure(&mut t, &err, Some(2)));
        assert_eq!(t.retry_count, Some(1));
        assert_eq!(t.status, TaskStatus::Processing);
        assert!(t.failure_reason.as_deref().unwrap().contains("status 1"));

        assert!(record_failure(&mut t, &err, Some(2)));
        assert_eq!(t.retry_count, Some(2));
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn merge_keeps_producer_additions_and_applies_our_updates() {
        // Our snapshot: task 1 finished this cycle
        let mut ours_task = task(1, TaskStatus::Ready);
        ours_task.splat_path = Some("outputs/1.ply".into());
        let ours = vec![ours_task.clone(), task(2, TaskStatus::Pending)];

        // Meanwhile the producer appended task 3 and touched task 2
        let mut latest_task2 = task(2, TaskStatus::Pending);
        latest_task2
            .extra
            .insert("note".into(), serde_json::Value::String("edited".into()));
        let latest = vec![task(1, TaskStatus::Processing), latest_task2.clone(), task(3, TaskStatus::Processing)];

        let merged = merge_updates(latest, &ours, &[TaskId::Int(1)]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], ours_task);
        assert_eq!(merged[1], latest_task2);
        assert_eq!(merged[2], task(3, TaskStatus::Processing));
    }

    #[test]
    fn merge_drops_updates_for_tasks_removed_remotely() {
        let ours = vec![task(1, TaskStatus::Ready)];
        let latest = vec![task(2, TaskStatus::Processing)];

        let merged = merge_updates(latest, &ours, &[TaskId::Int(1)]);
        assert_eq!(merged, vec![task(2, TaskStatus::Processing)]);
    }
}
