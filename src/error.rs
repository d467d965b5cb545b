//! # Core Error Types
//!
//! Structured error handling for the task execution core and its file/data
//! collaborators, using thiserror instead of `Box<dyn Error>` patterns.
//!
//! Over-capacity submission is deliberately absent from this taxonomy:
//! submissions beyond the worker cap queue, they never fail.

use thiserror::Error;

use crate::state_machine::TaskState;
use crate::task::TaskId;

/// Errors surfaced by the task core and the collaborators it schedules.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    #[error("Task {task_id} is not finished yet (current state: {state})")]
    ResultNotReady { task_id: TaskId, state: TaskState },

    #[error("Task {task_id} timed out: {message}")]
    TaskTimeout { task_id: TaskId, message: String },

    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    #[error("Task {task_id} was cancelled: {message}")]
    TaskCancelled { task_id: TaskId, message: String },

    #[error("Illegal state transition from {from} on event {event}")]
    InvalidTransition { from: TaskState, event: String },

    #[error("Scheduler unavailable: {message}")]
    SchedulerUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("Unsupported file type: .{extension}")]
    UnsupportedFileType { extension: String },

    #[error("File too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Malformed CSV input: {message}")]
    MalformedCsv { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
