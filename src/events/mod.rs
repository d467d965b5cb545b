//! Task lifecycle events
//!
//! The audit-sink boundary: the core announces submitted/started/completed/
//! failed/timed-out/cancelled transitions here, and whatever stores or
//! renders the audit trail subscribes. Storage format is the subscriber's
//! business.

pub mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent, LifecycleEventKind};
