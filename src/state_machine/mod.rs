//! Task lifecycle state machine
//!
//! A pure transition table for the background task lifecycle. Keeping the
//! table free of store and scheduler concerns makes the legal state graph
//! testable on its own; the scheduler and service apply it through the
//! store's `mark_*` helpers, inside the entry lock.

pub mod events;
pub mod states;

pub use events::TaskEvent;
pub use states::TaskState;

use crate::error::CoreError;

/// Determine the target state for an event, or reject the transition.
///
/// The graph is one-directional: Pending → Running → {Completed, Failed,
/// TimedOut}, with Pending → Cancelled as the only other edge. Terminal
/// states accept no events.
pub fn transition(current: TaskState, event: &TaskEvent) -> Result<TaskState, CoreError> {
    let target = match (current, event) {
        (TaskState::Pending, TaskEvent::Start) => TaskState::Running,
        (TaskState::Pending, TaskEvent::Cancel) => TaskState::Cancelled,

        (TaskState::Running, TaskEvent::Complete) => TaskState::Completed,
        (TaskState::Running, TaskEvent::Fail(_)) => TaskState::Failed,
        (TaskState::Running, TaskEvent::Timeout) => TaskState::TimedOut,

        (from, event) => {
            return Err(CoreError::InvalidTransition {
                from,
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions() {
        assert_eq!(
            transition(TaskState::Pending, &TaskEvent::Start).unwrap(),
            TaskState::Running
        );
        assert_eq!(
            transition(TaskState::Pending, &TaskEvent::Cancel).unwrap(),
            TaskState::Cancelled
        );
        assert!(transition(TaskState::Pending, &TaskEvent::Complete).is_err());
        assert!(transition(TaskState::Pending, &TaskEvent::Timeout).is_err());
    }

    #[test]
    fn running_transitions() {
        assert_eq!(
            transition(TaskState::Running, &TaskEvent::Complete).unwrap(),
            TaskState::Completed
        );
        assert_eq!(
            transition(TaskState::Running, &TaskEvent::Fail("boom".into())).unwrap(),
            TaskState::Failed
        );
        assert_eq!(
            transition(TaskState::Running, &TaskEvent::Timeout).unwrap(),
            TaskState::TimedOut
        );
        // Cancellation is only honored pre-dispatch
        assert!(transition(TaskState::Running, &TaskEvent::Cancel).is_err());
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let terminals = [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::TimedOut,
            TaskState::Cancelled,
        ];
        let events = [
            TaskEvent::Start,
            TaskEvent::Complete,
            TaskEvent::Fail("x".into()),
            TaskEvent::Timeout,
            TaskEvent::Cancel,
        ];
        for state in terminals {
            for event in &events {
                assert!(
                    transition(state, event).is_err(),
                    "{state} should reject {}",
                    event.event_type()
                );
            }
        }
    }
}
