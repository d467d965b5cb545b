use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// A worker slot was acquired and execution begins
    Start,
    /// The work function returned successfully
    Complete,
    /// The work function returned an error
    Fail(String),
    /// The wall-clock budget elapsed before the work finished
    Timeout,
    /// The caller cancelled the task before dispatch
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Timeout => "timeout",
            Self::Cancel => "cancel",
        }
    }

}
