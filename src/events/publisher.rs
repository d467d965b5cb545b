use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::task::TaskId;

/// Lifecycle transition categories announced by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Submitted,
    Started,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl LifecycleEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submitted => "task.submitted",
            Self::Started => "task.started",
            Self::Completed => "task.completed",
            Self::Failed => "task.failed",
            Self::TimedOut => "task.timed_out",
            Self::Cancelled => "task.cancelled",
        }
    }
}

/// A lifecycle event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub task_id: TaskId,
    pub task_type: String,
    pub occurred_at: DateTime<Utc>,
    pub detail: Value,
}

/// Broadcast publisher for task lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventPublisher {
    /// Create a new publisher with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a lifecycle event.
    ///
    /// A broadcast send with zero subscribers returns an error; that is fine
    /// here, the audit sink is optional and events are best-effort.
    pub fn publish(
        &self,
        kind: LifecycleEventKind,
        task_id: TaskId,
        task_type: impl Into<String>,
        detail: Value,
    ) {
        let event = LifecycleEvent {
            kind,
            task_id,
            task_type: task_type.into(),
            occurred_at: Utc::now(),
            detail,
        };
        trace!(event = kind.name(), task_id = %task_id, "lifecycle event published");
        let _ = self.sender.send(event);
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();

        let task_id = TaskId::generate();
        publisher.publish(
            LifecycleEventKind::Submitted,
            task_id,
            "merge",
            json!({"files": 2}),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, LifecycleEventKind::Submitted);
        assert_eq!(event.task_id, task_id);
        assert_eq!(event.detail["files"], 2);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let publisher = EventPublisher::new(8);
        publisher.publish(
            LifecycleEventKind::Completed,
            TaskId::generate(),
            "merge",
            json!({}),
        );
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
