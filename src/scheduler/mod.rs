//! # Scheduler / Worker Pool
//!
//! Bounded-concurrency execution of submitted tasks. A single dispatcher
//! loop drains a FIFO admission queue; before a task may enter the Running
//! state the dispatcher must hold one of N semaphore permits (the worker
//! slots), so at most `max_workers` tasks ever run simultaneously and tasks
//! are admitted in submission order. The permit travels into the spawned
//! worker and drops when the worker finishes, whatever the outcome, so a
//! slot is never permanently lost.
//!
//! Timeout semantics: each work future runs under [`tokio::time::timeout`].
//! On expiry the future is dropped, which cancels cooperative async work at
//! its next await point; a blocking section already handed to the blocking
//! pool finishes detached. The task record is marked TimedOut and the slot
//! is reclaimed immediately either way: the work is abandoned, not killed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{CoreError, Result};
use crate::events::{EventPublisher, LifecycleEventKind};
use crate::store::TaskStore;
use crate::task::{ProgressReporter, TaskId, WorkFn};

/// One admission-queue entry: the task id plus the work closure it owns
/// exclusively until dispatch.
struct QueuedTask {
    id: TaskId,
    task_type: String,
    work: WorkFn,
}

/// Bounded worker pool over an in-memory FIFO admission queue
pub struct Scheduler {
    queue_tx: Mutex<Option<mpsc::UnboundedSender<QueuedTask>>>,
    slots: Arc<Semaphore>,
    store: Arc<TaskStore>,
    config: SchedulerConfig,
    shutdown: Arc<Notify>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the dispatcher loop and the retention purge sweep
    pub fn start(
        config: SchedulerConfig,
        store: Arc<TaskStore>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let slots = Arc::new(Semaphore::new(config.max_workers));
        let shutdown = Arc::new(Notify::new());

        info!(
            max_workers = config.max_workers,
            task_timeout_seconds = config.task_timeout_seconds,
            "scheduler starting"
        );

        let dispatcher = tokio::spawn(dispatch_loop(
            queue_rx,
            slots.clone(),
            store.clone(),
            publisher,
            config.clone(),
        ));
        let sweeper = tokio::spawn(purge_loop(store.clone(), config.clone(), shutdown.clone()));

        Arc::new(Self {
            queue_tx: Mutex::new(Some(queue_tx)),
            slots,
            store,
            config,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Enqueue a pending task for FIFO admission.
    ///
    /// Never blocks on the work and never fails for being over capacity;
    /// the only failure is a scheduler that has been shut down.
    pub fn enqueue(&self, id: TaskId, task_type: &str, work: WorkFn) -> Result<()> {
        let guard = self.queue_tx.lock();
        let tx = guard.as_ref().ok_or_else(|| CoreError::SchedulerUnavailable {
            message: "scheduler has been shut down".to_string(),
        })?;
        tx.send(QueuedTask {
            id,
            task_type: task_type.to_string(),
            work,
        })
        .map_err(|_| CoreError::SchedulerUnavailable {
            message: "admission queue is closed".to_string(),
        })
    }

    /// Number of currently free worker slots
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Configured concurrency cap
    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Stop admission, drain already-queued tasks, and stop the purge sweep.
    ///
    /// Tasks still running keep their slots until they finish or time out;
    /// this is a drain, not an abort.
    pub async fn shutdown(&self) {
        info!("scheduler shutting down");
        self.queue_tx.lock().take();
        // notify_one stores a permit, so the sweeper wakes even if it has
        // not reached its select yet.
        self.shutdown.notify_one();

        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatcher task panicked during shutdown");
            }
        }
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                error!(error = %e, "purge sweep task panicked during shutdown");
            }
        }
    }

    /// Store handle, for callers that need to consult task state directly
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }
}

/// Single dispatcher loop: dequeue in FIFO order, wait for a free slot, mark
/// Running, and hand the work to its own spawned worker. The loop never
/// awaits task completion, so one task's failure cannot stall admission.
async fn dispatch_loop(
    mut queue_rx: mpsc::UnboundedReceiver<QueuedTask>,
    slots: Arc<Semaphore>,
    store: Arc<TaskStore>,
    publisher: EventPublisher,
    config: SchedulerConfig,
) {
    while let Some(queued) = queue_rx.recv().await {
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Tasks cancelled while queued (or while waiting for this slot)
        // must never run; the transition table rejects Start for them.
        if let Err(e) = store.mark_started(queued.id) {
            debug!(task_id = %queued.id, reason = %e, "skipping dequeued task");
            drop(permit);
            continue;
        }

        publisher.publish(
            LifecycleEventKind::Started,
            queued.id,
            &queued.task_type,
            json!({}),
        );
        debug!(task_id = %queued.id, task_type = %queued.task_type, "task dispatched");

        let reporter = ProgressReporter::new(queued.id, store.clone());

        let store = store.clone();
        let publisher = publisher.clone();
        let timeout = config.task_timeout();
        let timeout_seconds = config.task_timeout_seconds;
        let task_type = queued.task_type;
        let id = queued.id;
        let work = queued.work;

        tokio::spawn(async move {
            // catch_unwind turns a panicking work function into an ordinary
            // failure; without it the record would stay Running forever.
            let guarded = AssertUnwindSafe(async move { work(reporter).await }).catch_unwind();
            match tokio::time::timeout(timeout, guarded).await {
                Ok(Ok(Ok(value))) => {
                    if let Err(e) = store.mark_completed(id, value) {
                        warn!(task_id = %id, error = %e, "could not record completion");
                    } else {
                        info!(task_id = %id, task_type = %task_type, "task completed");
                        publisher.publish(LifecycleEventKind::Completed, id, &task_type, json!({}));
                    }
                }
                Ok(Ok(Err(cause))) => {
                    record_failure(&store, &publisher, id, &task_type, format!("{cause:#}"));
                }
                Ok(Err(panic)) => {
                    record_failure(&store, &publisher, id, &task_type, panic_message(panic.as_ref()));
                }
                Err(_elapsed) => {
                    if let Err(e) = store.mark_timed_out(id, timeout_seconds) {
                        warn!(task_id = %id, error = %e, "could not record timeout");
                    } else {
                        warn!(
                            task_id = %id,
                            task_type = %task_type,
                            timeout_seconds,
                            "task timed out; work abandoned"
                        );
                        publisher.publish(
                            LifecycleEventKind::TimedOut,
                            id,
                            &task_type,
                            json!({ "timeout_seconds": timeout_seconds }),
                        );
                    }
                }
            }
            // Slot reclaimed here on every path
            drop(permit);
        });
    }

    debug!("dispatcher loop exited");
}

fn record_failure(
    store: &TaskStore,
    publisher: &EventPublisher,
    id: TaskId,
    task_type: &str,
    message: String,
) {
    if let Err(e) = store.mark_failed(id, message.clone()) {
        warn!(task_id = %id, error = %e, "could not record failure");
    } else {
        error!(task_id = %id, task_type, error = %message, "task failed");
        publisher.publish(
            LifecycleEventKind::Failed,
            id,
            task_type,
            json!({ "error": message }),
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("work function panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("work function panicked: {s}")
    } else {
        "work function panicked".to_string()
    }
}

/// Periodic retention sweep over the task store
async fn purge_loop(store: Arc<TaskStore>, config: SchedulerConfig, shutdown: Arc<Notify>) {
    let mut interval = tokio::time::interval(config.purge_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so startup is quiet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.purge(config.task_retention());
            }
            _ = shutdown.notified() => break,
        }
    }
}
