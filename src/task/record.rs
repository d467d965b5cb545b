use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::state_machine::TaskState;

/// Opaque task identifier, generated at submission time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Classification of a captured task error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The work function returned an error
    Failure,
    /// The wall-clock budget elapsed
    Timeout,
    /// The task was cancelled before dispatch
    Cancelled,
}

/// Error captured on a task record when it reaches a failed terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    pub kind: TaskErrorKind,
}

impl TaskError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Failure,
        }
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        Self {
            message: format!("task exceeded its time budget of {timeout_seconds}s"),
            kind: TaskErrorKind::Timeout,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "task was cancelled before execution".to_string(),
            kind: TaskErrorKind::Cancelled,
        }
    }
}

/// Timestamped progress message appended by the executing worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNote {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// One unit of schedulable background work, as tracked by the store.
///
/// The record is cloneable so `get`/`list` can hand out snapshots; the work
/// closure itself travels in the scheduler's admission queue entry and is
/// consumed at dispatch, so it is owned exclusively until execution starts.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_type: String,
    pub status: TaskState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub progress_log: Vec<ProgressNote>,
    pub result: Option<Value>,
    pub error: Option<TaskError>,
}

impl TaskRecord {
    /// Create a fresh pending record
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            task_type: task_type.into(),
            status: TaskState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0,
            progress_log: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Condensed view for status polling and admin listings
    pub fn status_view(&self) -> TaskStatus {
        TaskStatus {
            task_id: self.id,
            task_type: self.task_type.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

/// Serializable status record returned by the polling API
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_type: String,
    pub status: TaskState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub error: Option<TaskError>,
}
