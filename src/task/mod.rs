//! Task identity, record, and payload types
//!
//! A task record carries identity plus the mutable status/result fields the
//! store tracks; the boxed work closure is a separate payload consumed at
//! dispatch time.

pub mod payload;
pub mod progress;
pub mod record;

pub use payload::{work_fn, WorkFn, WorkFuture, WorkOutput};
pub use progress::ProgressReporter;
pub use record::{ProgressNote, TaskError, TaskErrorKind, TaskId, TaskRecord, TaskStatus};
