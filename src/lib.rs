#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sheetmerge Core
//!
//! Background task execution core for the sheetmerge spreadsheet
//! consolidation service: a bounded-concurrency, in-memory job queue that
//! runs merge/processing work off the request path, tracks per-task state
//! transitions, and exposes polling for status and results.
//!
//! ## Architecture
//!
//! The web layer translates HTTP requests into calls on [`TaskService`]
//! (`submit_task`, `get_task_status`, `get_task_result`, `cancel_task`,
//! `list_tasks`) and renders whatever the core reports back. The core never
//! owns a wire protocol.
//!
//! Submitted work is a boxed closure with a uniform signature; the
//! scheduler does not know whether it is merging spreadsheets or something
//! else entirely. A fixed-size slot set (tokio semaphore) caps concurrency,
//! admission is FIFO, each task runs under a wall-clock timeout, and one
//! task's failure never touches its siblings or the pool.
//!
//! ## Module Organization
//!
//! - [`task`] - Task identity, records, payloads, progress reporting
//! - [`state_machine`] - The legal lifecycle transition table
//! - [`store`] - In-memory task store with atomic updates and retention
//! - [`scheduler`] - FIFO admission, bounded worker slots, timeouts
//! - [`service`] - The submit/status/result/cancel/list facade
//! - [`events`] - Lifecycle event broadcast (audit sink boundary)
//! - [`files`] - Upload/result file management collaborator
//! - [`data`] - Table model, cleaning/merge pipeline, merge job builder
//! - [`config`] - Environment-aware configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetmerge_core::config::SheetmergeConfig;
//! use sheetmerge_core::service::TaskService;
//! use sheetmerge_core::task::work_fn;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SheetmergeConfig::default();
//! let service = TaskService::start(&config);
//!
//! let task_id = service.submit_task(
//!     "demo",
//!     work_fn(|progress| {
//!         Box::pin(async move {
//!             progress.update(50, "halfway there");
//!             Ok(serde_json::json!({"answer": 42}))
//!         })
//!     }),
//! )?;
//!
//! let status = service.get_task_status(task_id)?;
//! println!("task {} is {}", task_id, status.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod files;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod task;

pub use config::{ConfigManager, SheetmergeConfig};
pub use error::{CoreError, Result};
pub use events::{EventPublisher, LifecycleEvent, LifecycleEventKind};
pub use scheduler::Scheduler;
pub use service::TaskService;
pub use state_machine::{TaskEvent, TaskState};
pub use store::TaskStore;
pub use task::{
    work_fn, ProgressReporter, TaskError, TaskErrorKind, TaskId, TaskRecord, TaskStatus, WorkFn,
};
