//! # In-Memory Task Store
//!
//! The single piece of shared mutable state in the core. One store is
//! constructed per process and injected into the scheduler and the service
//! facade, never reached through ambient globals.
//!
//! All mutation goes through [`TaskStore::update`], an atomic
//! read-modify-write under the map's per-key entry lock, so concurrent
//! workers and the scheduler never observe a torn record. Lifecycle
//! transitions additionally pass through the state machine's transition
//! table, which is what makes terminal states exactly-once: a second
//! completion attempt surfaces as `InvalidTransition` instead of silently
//! overwriting.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::state_machine::{transition, TaskEvent, TaskState};
use crate::task::{TaskError, TaskId, TaskRecord};

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<TaskId, TaskRecord>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Insert a freshly created record
    pub fn put(&self, record: TaskRecord) {
        self.tasks.insert(record.id, record);
    }

    /// Snapshot a record by id
    pub fn get(&self, task_id: TaskId) -> Result<TaskRecord> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.value().clone())
            .ok_or(CoreError::TaskNotFound { task_id })
    }

    /// Atomic read-modify-write on one record.
    ///
    /// The mutator runs under the entry lock; keep it to O(1) bookkeeping.
    pub fn update<R>(
        &self,
        task_id: TaskId,
        mutator: impl FnOnce(&mut TaskRecord) -> Result<R>,
    ) -> Result<R> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or(CoreError::TaskNotFound { task_id })?;
        mutator(entry.value_mut())
    }

    /// List record snapshots, optionally filtered by state, newest first
    pub fn list(&self, filter: Option<TaskState>) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .tasks
            .iter()
            .filter(|entry| filter.map_or(true, |state| entry.status == state))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Number of records currently in the Running state
    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.status == TaskState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop terminal records older than the retention window.
    ///
    /// Pending and Running records are never purged regardless of age;
    /// removing a record deletes bookkeeping only, never an output file.
    pub fn purge(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let before = self.tasks.len();
        self.tasks.retain(|_, record| {
            if !record.status.is_terminal() {
                return true;
            }
            record.finished_at.unwrap_or(record.created_at) >= cutoff
        });
        let removed = before - self.tasks.len();
        if removed > 0 {
            info!(removed, "purged expired task records");
        }
        removed
    }

    // Lifecycle transitions. Each applies the transition table inside the
    // entry lock, so legality and the record mutation are one atomic step.

    /// Pending → Running, stamping `started_at`
    pub fn mark_started(&self, task_id: TaskId) -> Result<()> {
        self.update(task_id, |record| {
            record.status = transition(record.status, &TaskEvent::Start)?;
            record.started_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Running → Completed, capturing the result exactly once
    pub fn mark_completed(&self, task_id: TaskId, result: Value) -> Result<()> {
        self.update(task_id, |record| {
            record.status = transition(record.status, &TaskEvent::Complete)?;
            record.finished_at = Some(Utc::now());
            record.progress = 100;
            record.result = Some(result);
            Ok(())
        })
    }

    /// Running → Failed, capturing message and classification
    pub fn mark_failed(&self, task_id: TaskId, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.update(task_id, |record| {
            record.status = transition(record.status, &TaskEvent::Fail(message.clone()))?;
            record.finished_at = Some(Utc::now());
            record.error = Some(TaskError::failure(message.clone()));
            Ok(())
        })
    }

    /// Running → TimedOut after the wall-clock budget elapsed
    pub fn mark_timed_out(&self, task_id: TaskId, timeout_seconds: u64) -> Result<()> {
        self.update(task_id, |record| {
            record.status = transition(record.status, &TaskEvent::Timeout)?;
            record.finished_at = Some(Utc::now());
            record.error = Some(TaskError::timeout(timeout_seconds));
            Ok(())
        })
    }

    /// Pending → Cancelled. Returns false (without mutating) for any task
    /// that already left the queue; cancellation is only guaranteed
    /// pre-dispatch.
    pub fn cancel_if_pending(&self, task_id: TaskId) -> Result<bool> {
        self.update(task_id, |record| {
            if record.status != TaskState::Pending {
                return Ok(false);
            }
            record.status = transition(record.status, &TaskEvent::Cancel)?;
            record.finished_at = Some(Utc::now());
            record.error = Some(TaskError::cancelled());
            Ok(true)
        })
    }
}
