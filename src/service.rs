//! # Task Service Facade
//!
//! The surface the web layer talks to: submit work, poll status, fetch
//! results, cancel, and list. The service owns nothing the scheduler and
//! store do not already own; it is the wiring of one store, one scheduler,
//! and one event publisher, constructed once per process.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::SheetmergeConfig;
use crate::error::{CoreError, Result};
use crate::events::{EventPublisher, LifecycleEventKind};
use crate::scheduler::Scheduler;
use crate::state_machine::TaskState;
use crate::store::TaskStore;
use crate::task::{TaskErrorKind, TaskId, TaskRecord, TaskStatus, WorkFn};

/// Background task execution core: submission, polling, cancellation
pub struct TaskService {
    store: Arc<TaskStore>,
    scheduler: Arc<Scheduler>,
    publisher: EventPublisher,
}

impl TaskService {
    /// Construct the core from configuration, starting the worker pool
    pub fn start(config: &SheetmergeConfig) -> Self {
        let store = Arc::new(TaskStore::new());
        let publisher = EventPublisher::new(config.events.channel_capacity);
        let scheduler = Scheduler::start(config.scheduler.clone(), store.clone(), publisher.clone());
        Self {
            store,
            scheduler,
            publisher,
        }
    }

    /// Submit a work function for background execution.
    ///
    /// Returns immediately with a fresh task id; the work starts when a slot
    /// frees. Identical submissions are not deduplicated. Fails only if the
    /// scheduler has shut down.
    pub fn submit_task(&self, task_type: &str, work: WorkFn) -> Result<TaskId> {
        let record = TaskRecord::new(task_type);
        let id = record.id;
        self.store.put(record);

        // Announce before enqueueing so subscribers always observe
        // Submitted ahead of Started.
        self.publisher
            .publish(LifecycleEventKind::Submitted, id, task_type, json!({}));

        if let Err(e) = self.scheduler.enqueue(id, task_type, work) {
            // Loud failure: retire the orphaned record through the normal
            // cancellation path so callers never see a Pending task that
            // can no longer run.
            let _ = self.store.cancel_if_pending(id);
            return Err(e);
        }

        info!(task_id = %id, task_type, "task submitted");
        Ok(id)
    }

    /// Current status record for a task
    pub fn get_task_status(&self, task_id: TaskId) -> Result<TaskStatus> {
        Ok(self.store.get(task_id)?.status_view())
    }

    /// Final result value for a task.
    ///
    /// `ResultNotReady` before a terminal state; the captured error for
    /// Failed/TimedOut/Cancelled; idempotent reads after completion.
    pub fn get_task_result(&self, task_id: TaskId) -> Result<Value> {
        let record = self.store.get(task_id)?;

        if !record.status.is_terminal() {
            return Err(CoreError::ResultNotReady {
                task_id,
                state: record.status,
            });
        }

        if let Some(error) = record.error {
            return Err(match error.kind {
                TaskErrorKind::Timeout => CoreError::TaskTimeout {
                    task_id,
                    message: error.message,
                },
                TaskErrorKind::Cancelled => CoreError::TaskCancelled {
                    task_id,
                    message: error.message,
                },
                TaskErrorKind::Failure => CoreError::TaskFailed {
                    task_id,
                    message: error.message,
                },
            });
        }

        record.result.ok_or(CoreError::ResultNotReady {
            task_id,
            state: record.status,
        })
    }

    /// Cancel a task. Returns true only if it was still Pending; a task
    /// that has begun running proceeds to its normal terminal state.
    pub fn cancel_task(&self, task_id: TaskId) -> Result<bool> {
        let cancelled = self.store.cancel_if_pending(task_id)?;
        if cancelled {
            let record = self.store.get(task_id)?;
            info!(task_id = %task_id, "task cancelled before dispatch");
            self.publisher.publish(
                LifecycleEventKind::Cancelled,
                task_id,
                &record.task_type,
                json!({}),
            );
        }
        Ok(cancelled)
    }

    /// Status records for all retained tasks, optionally filtered by state
    pub fn list_tasks(&self, filter: Option<TaskState>) -> Vec<TaskStatus> {
        self.store
            .list(filter)
            .into_iter()
            .map(|record| record.status_view())
            .collect()
    }

    /// Subscribe to lifecycle events (the audit sink boundary)
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<crate::events::LifecycleEvent> {
        self.publisher.subscribe()
    }

    /// Number of currently free worker slots
    pub fn available_slots(&self) -> usize {
        self.scheduler.available_slots()
    }

    /// Stop admission and drain queued tasks
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
