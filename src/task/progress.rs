use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::record::{ProgressNote, TaskId};
use crate::state_machine::TaskState;
use crate::store::TaskStore;

/// Progress hook handed to the executing worker.
///
/// The only sanctioned way for a work function to touch its task record:
/// percentage updates are clamped to 0–100 and never move backwards, and
/// updates are dropped once the task has left the Running state (a timed-out
/// task abandoned in the background cannot scribble on its terminal record).
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    store: Arc<TaskStore>,
}

impl ProgressReporter {
    pub(crate) fn new(task_id: TaskId, store: Arc<TaskStore>) -> Self {
        Self { task_id, store }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Record a progress percentage, optionally with a log message
    pub fn update(&self, percent: u8, message: impl Into<String>) {
        let percent = percent.min(100);
        let message = message.into();
        let outcome = self.store.update(self.task_id, |record| {
            if record.status != TaskState::Running {
                return Ok(());
            }
            record.progress = record.progress.max(percent);
            if !message.is_empty() {
                record.progress_log.push(ProgressNote {
                    at: Utc::now(),
                    message: message.clone(),
                });
            }
            Ok(())
        });

        if outcome.is_err() {
            // Record already purged; nothing left to report against.
            debug!(task_id = %self.task_id, "progress update for unknown task dropped");
        }
    }
}
