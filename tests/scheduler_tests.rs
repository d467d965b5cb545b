//! Scheduler and task lifecycle integration tests.
//!
//! Timing-sensitive properties run under tokio's paused clock so virtual
//! hours elapse instantly and deterministically; coordination between the
//! test and in-flight work goes through notify gates rather than real
//! sleeps wherever an interleaving must be observed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::sleep;

use sheetmerge_core::config::SheetmergeConfig;
use sheetmerge_core::error::CoreError;
use sheetmerge_core::service::TaskService;
use sheetmerge_core::state_machine::TaskState;
use sheetmerge_core::task::{work_fn, TaskId, WorkFn};
use sheetmerge_core::LifecycleEventKind;

fn test_config(max_workers: usize, timeout_seconds: u64) -> SheetmergeConfig {
    let mut config = SheetmergeConfig::default();
    config.scheduler.max_workers = max_workers;
    config.scheduler.task_timeout_seconds = timeout_seconds;
    config
}

/// Work that completes immediately with the given marker value
fn quick_task(marker: i64) -> WorkFn {
    work_fn(move |_progress| Box::pin(async move { Ok(json!(marker)) }))
}

/// Work that blocks until the gate is released
fn gated_task(gate: Arc<Notify>) -> WorkFn {
    work_fn(move |_progress| {
        Box::pin(async move {
            gate.notified().await;
            Ok(json!("released"))
        })
    })
}

async fn wait_for_state(service: &TaskService, id: TaskId, state: TaskState) {
    tokio::time::timeout(Duration::from_secs(200_000), async {
        loop {
            if service.get_task_status(id).unwrap().status == state {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {id} never reached {state}"));
}

async fn wait_for_terminal(service: &TaskService, id: TaskId) -> TaskState {
    tokio::time::timeout(Duration::from_secs(200_000), async {
        loop {
            let status = service.get_task_status(id).unwrap().status;
            if status.is_terminal() {
                return status;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {id} never reached a terminal state"))
}

#[tokio::test]
async fn completed_task_reports_result_and_timestamps() {
    let service = TaskService::start(&test_config(2, 3600));

    let id = service.submit_task("demo", quick_task(42)).unwrap();
    wait_for_state(&service, id, TaskState::Completed).await;

    let status = service.get_task_status(id).unwrap();
    assert_eq!(status.progress, 100);
    assert!(status.created_at <= status.started_at.unwrap());
    assert!(status.started_at.unwrap() <= status.finished_at.unwrap());
    assert!(status.error.is_none());

    assert_eq!(service.get_task_result(id).unwrap(), json!(42));
}

#[tokio::test]
async fn result_reads_are_idempotent() {
    let service = TaskService::start(&test_config(1, 3600));
    let id = service.submit_task("demo", quick_task(7)).unwrap();
    wait_for_state(&service, id, TaskState::Completed).await;

    let first = service.get_task_result(id).unwrap();
    let second = service.get_task_result(id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, json!(7));
}

#[tokio::test]
async fn result_before_terminal_is_not_ready() {
    let service = TaskService::start(&test_config(1, 3600));
    let gate = Arc::new(Notify::new());
    let id = service.submit_task("demo", gated_task(gate.clone())).unwrap();
    wait_for_state(&service, id, TaskState::Running).await;

    assert!(matches!(
        service.get_task_result(id),
        Err(CoreError::ResultNotReady { .. })
    ));

    gate.notify_one();
    wait_for_state(&service, id, TaskState::Completed).await;
    assert!(service.get_task_result(id).is_ok());
}

#[tokio::test]
async fn unknown_task_id_is_not_found() {
    let service = TaskService::start(&test_config(1, 3600));
    let missing = TaskId::generate();
    assert!(matches!(
        service.get_task_status(missing),
        Err(CoreError::TaskNotFound { .. })
    ));
    assert!(matches!(
        service.get_task_result(missing),
        Err(CoreError::TaskNotFound { .. })
    ));
}

#[tokio::test]
async fn failed_task_surfaces_its_error() {
    let service = TaskService::start(&test_config(1, 3600));
    let id = service
        .submit_task(
            "demo",
            work_fn(|_progress| {
                Box::pin(async move { Err(anyhow::anyhow!("header row missing")) })
            }),
        )
        .unwrap();

    assert_eq!(wait_for_terminal(&service, id).await, TaskState::Failed);

    let status = service.get_task_status(id).unwrap();
    assert!(status.error.unwrap().message.contains("header row missing"));

    match service.get_task_result(id) {
        Err(CoreError::TaskFailed { message, .. }) => {
            assert!(message.contains("header row missing"));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn panicking_task_is_recorded_as_failed() {
    let service = TaskService::start(&test_config(1, 3600));
    let id = service
        .submit_task(
            "demo",
            work_fn(|_progress| Box::pin(async { panic!("payload blew up") })),
        )
        .unwrap();

    assert_eq!(wait_for_terminal(&service, id).await, TaskState::Failed);

    let status = service.get_task_status(id).unwrap();
    assert!(status.error.unwrap().message.contains("payload blew up"));
    assert!(status.finished_at.is_some());
    assert!(matches!(
        service.get_task_result(id),
        Err(CoreError::TaskFailed { .. })
    ));

    // The panicking task's slot must be reusable
    let next = service.submit_task("demo", quick_task(1)).unwrap();
    wait_for_state(&service, next, TaskState::Completed).await;
}

#[tokio::test]
async fn concurrency_never_exceeds_the_cap() {
    let service = TaskService::start(&test_config(2, 3600));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    for _ in 0..6 {
        let active = active.clone();
        let peak = peak.clone();
        let id = service
            .submit_task(
                "demo",
                work_fn(move |_progress| {
                    Box::pin(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!(null))
                    })
                }),
            )
            .unwrap();
        ids.push(id);
    }

    for id in ids {
        wait_for_state(&service, id, TaskState::Completed).await;
    }
    assert!(peak.load(Ordering::SeqCst) <= 2, "cap of 2 was exceeded");
}

#[tokio::test]
async fn over_capacity_submission_queues_and_preserves_fifo() {
    let service = TaskService::start(&test_config(1, 3600));
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Notify::new());

    // Occupy the single slot so everything else queues behind it
    let blocker = service.submit_task("demo", gated_task(gate.clone())).unwrap();
    wait_for_state(&service, blocker, TaskState::Running).await;

    let mut ids = Vec::new();
    for n in 0..4 {
        let order = order.clone();
        let id = service
            .submit_task(
                "demo",
                work_fn(move |_progress| {
                    Box::pin(async move {
                        order.lock().push(n);
                        Ok(json!(n))
                    })
                }),
            )
            .unwrap();
        ids.push(id);
    }

    // All queued tasks stay Pending while the slot is held
    for id in &ids {
        assert_eq!(
            service.get_task_status(*id).unwrap().status,
            TaskState::Pending
        );
    }

    gate.notify_one();
    for id in &ids {
        wait_for_state(&service, *id, TaskState::Completed).await;
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_task_frees_its_slot() {
    let service = TaskService::start(&test_config(1, 2));

    let stuck = service
        .submit_task(
            "demo",
            work_fn(|_progress| {
                Box::pin(async move {
                    sleep(Duration::from_secs(10_000)).await;
                    Ok(json!("should never finish"))
                })
            }),
        )
        .unwrap();
    let next = service.submit_task("demo", quick_task(1)).unwrap();

    assert_eq!(wait_for_terminal(&service, stuck).await, TaskState::TimedOut);
    let status = service.get_task_status(stuck).unwrap();
    assert_eq!(status.error.unwrap().kind, sheetmerge_core::TaskErrorKind::Timeout);
    assert!(matches!(
        service.get_task_result(stuck),
        Err(CoreError::TaskTimeout { .. })
    ));

    // The abandoned task's slot must be reusable
    wait_for_state(&service, next, TaskState::Completed).await;
}

#[tokio::test]
async fn cancel_pending_task_before_dispatch() {
    let service = TaskService::start(&test_config(1, 3600));
    let gate = Arc::new(Notify::new());
    let ran = Arc::new(AtomicUsize::new(0));

    let blocker = service.submit_task("demo", gated_task(gate.clone())).unwrap();
    wait_for_state(&service, blocker, TaskState::Running).await;

    let ran_clone = ran.clone();
    let queued = service
        .submit_task(
            "demo",
            work_fn(move |_progress| {
                Box::pin(async move {
                    ran_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(null))
                })
            }),
        )
        .unwrap();

    assert!(service.cancel_task(queued).unwrap());
    assert_eq!(
        service.get_task_status(queued).unwrap().status,
        TaskState::Cancelled
    );

    gate.notify_one();
    wait_for_state(&service, blocker, TaskState::Completed).await;

    // Give the dispatcher a chance to (incorrectly) run the cancelled task
    sleep(Duration::from_millis(50)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0, "cancelled task must never run");
    assert_eq!(
        service.get_task_status(queued).unwrap().status,
        TaskState::Cancelled
    );
    assert!(matches!(
        service.get_task_result(queued),
        Err(CoreError::TaskCancelled { .. })
    ));
}

#[tokio::test]
async fn cancelling_a_running_task_is_refused() {
    let service = TaskService::start(&test_config(1, 3600));
    let gate = Arc::new(Notify::new());
    let id = service.submit_task("demo", gated_task(gate.clone())).unwrap();
    wait_for_state(&service, id, TaskState::Running).await;

    assert!(!service.cancel_task(id).unwrap());
    assert_eq!(service.get_task_status(id).unwrap().status, TaskState::Running);

    gate.notify_one();
    wait_for_state(&service, id, TaskState::Completed).await;
}

#[tokio::test(start_paused = true)]
async fn slow_siblings_do_not_block_a_quick_task_once_a_slot_frees() {
    // cap=2: two slow tasks occupy both slots; the quick third task stays
    // Pending, then runs as soon as the faster sibling finishes, completing
    // while the slower one is still running.
    let service = TaskService::start(&test_config(2, 3600));

    let t1 = service
        .submit_task(
            "demo",
            work_fn(|_progress| {
                Box::pin(async move {
                    sleep(Duration::from_secs(2)).await;
                    Ok(json!("t1"))
                })
            }),
        )
        .unwrap();
    let t2 = service
        .submit_task(
            "demo",
            work_fn(|_progress| {
                Box::pin(async move {
                    sleep(Duration::from_secs(4)).await;
                    Ok(json!("t2"))
                })
            }),
        )
        .unwrap();
    let t3 = service.submit_task("demo", quick_task(3)).unwrap();

    wait_for_state(&service, t1, TaskState::Running).await;
    wait_for_state(&service, t2, TaskState::Running).await;
    assert_eq!(service.get_task_status(t3).unwrap().status, TaskState::Pending);

    wait_for_state(&service, t3, TaskState::Completed).await;
    // The slower sibling is still going when the quick task finishes
    assert_eq!(service.get_task_status(t2).unwrap().status, TaskState::Running);

    wait_for_state(&service, t1, TaskState::Completed).await;
    wait_for_state(&service, t2, TaskState::Completed).await;
}

#[tokio::test]
async fn progress_is_monotonic_and_clamped() {
    let service = TaskService::start(&test_config(1, 3600));
    let id = service
        .submit_task(
            "demo",
            work_fn(|progress| {
                Box::pin(async move {
                    progress.update(60, "most of the way");
                    progress.update(30, "stale update arrives late");
                    progress.update(200, "overshoot");
                    Ok(json!(null))
                })
            }),
        )
        .unwrap();

    wait_for_state(&service, id, TaskState::Completed).await;
    let status = service.get_task_status(id).unwrap();
    // Completion forces 100; along the way it never regressed below 60 and
    // the overshoot was clamped to 100.
    assert_eq!(status.progress, 100);
}

#[tokio::test]
async fn lifecycle_events_are_published_in_order() {
    let service = TaskService::start(&test_config(1, 3600));
    let mut events = service.subscribe_events();

    let id = service.submit_task("demo", quick_task(9)).unwrap();
    wait_for_state(&service, id, TaskState::Completed).await;

    let submitted = events.recv().await.unwrap();
    assert_eq!(submitted.kind, LifecycleEventKind::Submitted);
    assert_eq!(submitted.task_id, id);
    let started = events.recv().await.unwrap();
    assert_eq!(started.kind, LifecycleEventKind::Started);
    let completed = events.recv().await.unwrap();
    assert_eq!(completed.kind, LifecycleEventKind::Completed);
}

#[tokio::test]
async fn list_tasks_filters_by_state() {
    let service = TaskService::start(&test_config(1, 3600));
    let gate = Arc::new(Notify::new());

    let running = service.submit_task("merge", gated_task(gate.clone())).unwrap();
    wait_for_state(&service, running, TaskState::Running).await;
    let queued = service.submit_task("preview", quick_task(0)).unwrap();

    let all = service.list_tasks(None);
    assert_eq!(all.len(), 2);
    let pending = service.list_tasks(Some(TaskState::Pending));
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_id, queued);

    gate.notify_one();
    wait_for_state(&service, running, TaskState::Completed).await;
    wait_for_state(&service, queued, TaskState::Completed).await;
}

#[tokio::test]
async fn submission_fails_loudly_after_shutdown() {
    let service = TaskService::start(&test_config(1, 3600));
    service.shutdown().await;

    assert!(matches!(
        service.submit_task("demo", quick_task(1)),
        Err(CoreError::SchedulerUnavailable { .. })
    ));

    // The orphaned record is retired through the normal cancellation path,
    // terminal timestamp included
    let orphans = service.list_tasks(Some(TaskState::Cancelled));
    assert_eq!(orphans.len(), 1);
    assert!(orphans[0].finished_at.is_some());
    assert!(orphans[0].error.is_some());
}
