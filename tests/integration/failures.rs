//! Failure propagation tests.
//!
//! Tests that verify failures stop what depends on them, are reported by
//! declaration order, and never leave started work behind.

use crate::common::{record, record_slow, recording_bus};
use brisk::testing::{FailingAction, Journal, JournalEntry, TestHarness};
use brisk::{
    Event, Orchestrator, ResolveError, RunError, Step, TaskAction, TaskError, TaskId,
    TaskRegistry, TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn failing(registry: &mut TaskRegistry, name: &str, deps: &[&str], action: FailingAction) {
    registry
        .register(name, deps.iter().copied(), TaskAction::from_action(action))
        .unwrap();
}

/// Test: a failing dependency skips its dependents and names the culprit.
#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    failing(&mut registry, "lint:js", &[], FailingAction::new("2 problems"));
    record(&mut registry, &journal, "copy", &["lint:js"]);
    record(&mut registry, &journal, "archive", &["copy"]);

    let (bus, handler) = recording_bus().await;
    let orchestrator = Orchestrator::new(registry).with_event_bus(bus);
    let err = orchestrator.run("archive").await.unwrap_err();

    assert_eq!(err.task(), Some(&TaskId::new("lint:js")));
    assert!(err.to_string().contains("2 problems"));
    assert!(journal.started().is_empty());

    let skipped = handler
        .tasks_where(|e| matches!(e, Event::TaskSkipped { .. }))
        .await;
    assert_eq!(skipped, vec!["copy", "archive"]);

    let failed = handler
        .tasks_where(|e| matches!(e, Event::TaskFailed { .. }))
        .await;
    assert_eq!(failed, vec!["lint:js"]);
}

/// Test: the report records statuses for every planned task.
#[tokio::test]
async fn test_report_statuses_after_failure() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "clean", &[]);
    failing(&mut registry, "sass", &["clean"], FailingAction::new("syntax error"));
    record(&mut registry, &journal, "css", &["sass"]);

    let report = TestHarness::new(registry)
        .run_and_assert_failure("css")
        .await;

    assert_eq!(report.status(&TaskId::new("clean")), Some(TaskStatus::Completed));
    assert_eq!(report.status(&TaskId::new("sass")), Some(TaskStatus::Failed));
    assert_eq!(report.status(&TaskId::new("css")), Some(TaskStatus::Skipped));
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.completed, vec![TaskId::new("clean")]);
}

/// Test: with two failing members, the first declared is reported and both finish.
#[tokio::test]
async fn test_group_reports_first_declared_failure() {
    let first = Arc::new(FailingAction::new("first").with_delay(Duration::from_millis(80)));
    let second = Arc::new(FailingAction::new("second"));

    let mut registry = TaskRegistry::new();
    registry
        .register("a", Vec::<TaskId>::new(), TaskAction::Async(first.clone()))
        .unwrap();
    registry
        .register("b", Vec::<TaskId>::new(), TaskAction::Async(second.clone()))
        .unwrap();
    registry.alias("both", ["a", "b"]).unwrap();

    let report = TestHarness::new(registry).run_and_assert_failure("both").await;

    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
    assert_eq!(report.error.as_ref().and_then(RunError::task), Some(&TaskId::new("a")));
    assert_eq!(report.failed_count(), 2);
}

/// Test: a failing group member does not abandon its slower siblings.
#[tokio::test]
async fn test_group_waits_for_slow_siblings() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    failing(&mut registry, "lint", &[], FailingAction::new("lint failed"));
    record_slow(&mut registry, &journal, "images", &[], Duration::from_millis(80));

    let orchestrator = Orchestrator::new(registry);
    let err = orchestrator
        .run_sequence(&[Step::group(["lint", "images"])])
        .await
        .unwrap_err();

    assert_eq!(err.task(), Some(&TaskId::new("lint")));
    assert_eq!(journal.started(), vec!["images"]);
    assert!(
        journal
            .position(&JournalEntry::Finished(TaskId::new("images")))
            .is_some(),
        "images should finish before the group reports"
    );
}

/// Test: a sequence stops at the first failing step.
#[tokio::test]
async fn test_sequence_stops_at_failure() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "clean", &[]);
    failing(&mut registry, "copy", &[], FailingAction::new("disk full"));
    record(&mut registry, &journal, "minify", &[]);
    registry
        .sequence("build", Vec::<TaskId>::new(), ["clean", "copy", "minify"])
        .unwrap();

    let report = TestHarness::new(registry).run_and_assert_failure("build").await;

    assert_eq!(journal.started(), vec!["clean"]);
    assert_eq!(report.status(&TaskId::new("build")), Some(TaskStatus::Failed));
    assert_eq!(report.status(&TaskId::new("minify")), Some(TaskStatus::Pending));
    assert_eq!(report.failed_count(), 1);
    match report.error {
        Some(RunError::ActionFailed { ref task, ref source }) => {
            assert_eq!(task.as_str(), "copy");
            assert!(matches!(**source, TaskError::ExecutionFailed(ref m) if m == "disk full"));
        }
        other => panic!("Expected ActionFailed, got {:?}", other),
    }
}

/// Test: an unknown task anywhere in the tree fails before anything runs.
#[tokio::test]
async fn test_unknown_dependency_runs_nothing() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "clean", &[]);
    record(&mut registry, &journal, "copy", &["clean", "missing"]);

    let (bus, handler) = recording_bus().await;
    let orchestrator = Orchestrator::new(registry).with_event_bus(bus);
    let err = orchestrator.run("copy").await.unwrap_err();

    match err {
        RunError::Resolve(ResolveError::UnknownTask { task, required_by }) => {
            assert_eq!(task.as_str(), "missing");
            assert_eq!(required_by, Some(TaskId::new("copy")));
        }
        other => panic!("Expected UnknownTask, got {:?}", other),
    }
    assert!(journal.entries().is_empty());
    assert!(
        handler
            .tasks_where(|e| matches!(e, Event::TaskStarted { .. }))
            .await
            .is_empty()
    );
}

/// Test: a cycle fails resolution and names its members.
#[tokio::test]
async fn test_cycle_runs_nothing() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "a", &["c"]);
    record(&mut registry, &journal, "b", &["a"]);
    record(&mut registry, &journal, "c", &["b"]);

    let err = Orchestrator::new(registry).run("a").await.unwrap_err();

    match err {
        RunError::Resolve(ResolveError::CycleDetected(path)) => {
            for name in ["a", "b", "c"] {
                assert!(path.contains(&TaskId::new(name)), "{} missing from {:?}", name, path);
            }
        }
        other => panic!("Expected CycleDetected, got {:?}", other),
    }
    assert!(journal.entries().is_empty());
}

/// Test: a failed run does not poison the next one.
#[tokio::test]
async fn test_next_run_starts_fresh() {
    let flaky = Arc::new(FailingAction::new("transient").times(1));
    let mut registry = TaskRegistry::new();
    registry
        .register("fetch", Vec::<TaskId>::new(), TaskAction::Async(flaky.clone()))
        .unwrap();

    let harness = TestHarness::new(registry);
    harness.run_and_assert_failure("fetch").await;
    harness.run_and_assert_success("fetch").await;

    assert_eq!(flaky.call_count(), 2);
}

/// Test: a sync action error is wrapped with its task name.
#[tokio::test]
async fn test_sync_error_names_task() {
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "banner",
            Vec::<TaskId>::new(),
            TaskAction::sync(|_ctx| Err(TaskError::ExecutionFailed("no manifest".into()))),
        )
        .unwrap();

    let err = Orchestrator::new(registry).run("banner").await.unwrap_err();

    assert_eq!(err.to_string(), "task 'banner' failed: execution failed: no manifest");
}
