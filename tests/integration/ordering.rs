//! Ordering and concurrency tests.
//!
//! Tests that verify dependencies, groups and sequences run in the order they
//! promise, and that each task runs exactly once per run.

use crate::common::{record, record_slow, recording_bus};
use brisk::testing::{Journal, JournalEntry, TestHarness};
use brisk::{Event, Orchestrator, Step, TaskAction, TaskId, TaskRegistry, TaskStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// The h5bp-style build: clean, then lint and copy, then minify and archive.
fn site_registry(journal: &Arc<Journal>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    record(&mut registry, journal, "clean", &[]);
    record(&mut registry, journal, "lint:js", &[]);
    record(&mut registry, journal, "copy:index.html", &[]);
    record(&mut registry, journal, "copy:jquery", &[]);
    record(&mut registry, journal, "copy:misc", &[]);
    registry
        .alias("copy", ["copy:index.html", "copy:jquery", "copy:misc"])
        .unwrap();
    record(&mut registry, journal, "minify:css", &["copy"]);
    registry
        .sequence(
            "build",
            Vec::<TaskId>::new(),
            [Step::group(["clean", "lint:js"]), Step::from("copy"), Step::from("minify:css")],
        )
        .unwrap();
    record(&mut registry, journal, "archive:zip", &[]);
    registry
        .sequence(
            "archive",
            Vec::<TaskId>::new(),
            ["build", "archive:zip"],
        )
        .unwrap();
    registry.alias("default", ["build"]).unwrap();
    registry.set_default("default").unwrap();
    registry
}

/// Test: the full site build runs every step in order.
#[tokio::test]
async fn test_site_build_runs_steps_in_order() {
    let journal = Journal::new();
    let harness = TestHarness::new(site_registry(&journal));

    let report = harness.run_and_assert_success("archive").await;

    for task in ["clean", "lint:js", "copy:index.html", "copy:jquery", "copy:misc", "minify:css", "archive:zip"] {
        assert_eq!(journal.start_count(task), 1, "{} should run once", task);
        assert_eq!(report.status(&TaskId::new(task)), Some(TaskStatus::Completed));
    }

    assert!(journal.finished_before("clean", "copy:index.html"));
    assert!(journal.finished_before("lint:js", "copy:jquery"));
    assert!(journal.finished_before("copy:misc", "minify:css"));
    assert!(journal.finished_before("minify:css", "archive:zip"));
}

/// Test: the default task runs the build.
#[tokio::test]
async fn test_default_task_runs_build() {
    let journal = Journal::new();
    let orchestrator = Orchestrator::new(site_registry(&journal));

    let report = orchestrator.run_default().await.unwrap();

    assert!(report.success);
    assert_eq!(report.targets, vec![TaskId::new("default")]);
    assert_eq!(journal.start_count("minify:css"), 1);
    assert_eq!(journal.start_count("archive:zip"), 0);
}

/// Test: a dependency shared by several tasks runs once per run.
#[tokio::test]
async fn test_diamond_shares_dependency() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record_slow(&mut registry, &journal, "clean", &[], Duration::from_millis(20));
    record(&mut registry, &journal, "css", &["clean"]);
    record(&mut registry, &journal, "js", &["clean"]);
    record(&mut registry, &journal, "html", &["css", "js"]);

    let report = TestHarness::new(registry)
        .run_and_assert_success("html")
        .await;

    assert_eq!(journal.start_count("clean"), 1);
    assert!(journal.finished_before("clean", "css"));
    assert!(journal.finished_before("clean", "js"));
    assert!(journal.finished_before("css", "html"));
    assert!(journal.finished_before("js", "html"));
    assert_eq!(report.completed.last(), Some(&TaskId::new("html")));
    assert_eq!(report.completed_count(), 4);
}

/// Test: nothing is cached between runs.
#[tokio::test]
async fn test_each_run_executes_again() {
    let journal = Journal::new();
    let harness = TestHarness::new(site_registry(&journal));

    let first = harness.run_and_assert_success("copy").await;
    let second = harness.run_and_assert_success("copy").await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(journal.start_count("copy:jquery"), 2);
}

/// Test: group members overlap when the limit allows.
#[tokio::test]
async fn test_group_members_run_concurrently() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record_slow(&mut registry, &journal, "sass", &[], Duration::from_millis(100));
    record_slow(&mut registry, &journal, "uglify", &[], Duration::from_millis(100));
    registry.alias("assets", ["sass", "uglify"]).unwrap();

    TestHarness::new(registry)
        .with_concurrency(4)
        .run_and_assert_success("assets")
        .await;

    let entries = journal.entries();
    let starts = entries
        .iter()
        .take(2)
        .filter(|e| matches!(e, JournalEntry::Started(_)))
        .count();
    assert_eq!(starts, 2, "both actions should start before either finishes");
}

/// Test: a concurrency limit of one serializes action bodies.
#[tokio::test]
async fn test_concurrency_limit_serializes_actions() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record_slow(&mut registry, &journal, "a", &[], Duration::from_millis(30));
    record_slow(&mut registry, &journal, "b", &[], Duration::from_millis(30));
    record_slow(&mut registry, &journal, "c", &[], Duration::from_millis(30));
    registry.alias("all", ["a", "b", "c"]).unwrap();

    TestHarness::new(registry)
        .with_concurrency(1)
        .run_and_assert_success("all")
        .await;

    let entries = journal.entries();
    assert_eq!(entries.len(), 6);
    for pair in entries.chunks(2) {
        match pair {
            [JournalEntry::Started(a), JournalEntry::Finished(b)] => assert_eq!(a, b),
            other => panic!("actions overlapped: {:?}", other),
        }
    }
}

/// Test: nested waits do not hold permits, so a limit of one cannot deadlock.
#[tokio::test]
async fn test_nested_sequences_with_single_permit() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "a", &[]);
    record(&mut registry, &journal, "b", &["a"]);
    registry
        .sequence("inner", ["a"], ["b"])
        .unwrap();
    registry
        .sequence("outer", Vec::<TaskId>::new(), [Step::group(["inner", "b"])])
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        TestHarness::new(registry).with_concurrency(1).run("outer"),
    )
    .await
    .expect("run should not deadlock");

    assert!(result.success);
    assert_eq!(journal.started(), vec!["a", "b"]);
}

/// Test: sync actions run and complete on return.
#[tokio::test]
async fn test_sync_actions_complete_before_dependents() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen_by_dependent = Arc::new(AtomicUsize::new(usize::MAX));

    let mut registry = TaskRegistry::new();
    for name in ["one", "two", "three"] {
        let counter = Arc::clone(&counter);
        registry
            .register(
                name,
                Vec::<TaskId>::new(),
                TaskAction::sync(move |_ctx| {
                    std::thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
    }
    let (c, seen) = (Arc::clone(&counter), Arc::clone(&seen_by_dependent));
    registry
        .register(
            "report",
            ["one", "two", "three"],
            TaskAction::sync(move |_ctx| {
                seen.store(c.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    TestHarness::new(registry)
        .run_and_assert_success("report")
        .await;

    assert_eq!(seen_by_dependent.load(Ordering::SeqCst), 3);
}

/// Test: lifecycle events bracket the run and each task.
#[tokio::test]
async fn test_events_follow_task_lifecycle() {
    let journal = Journal::new();
    let mut registry = TaskRegistry::new();
    record(&mut registry, &journal, "clean", &[]);
    record(&mut registry, &journal, "copy", &["clean"]);

    let (bus, handler) = recording_bus().await;
    let orchestrator = Orchestrator::new(registry).with_event_bus(bus);
    let report = orchestrator.run("copy").await.unwrap();

    let events = handler.events().await;
    assert!(matches!(events.first(), Some(Event::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(Event::RunCompleted { success: true, .. })
    ));
    assert!(events.iter().all(|e| e.run_id() == report.run_id));

    let started = handler
        .tasks_where(|e| matches!(e, Event::TaskStarted { .. }))
        .await;
    let completed = handler
        .tasks_where(|e| matches!(e, Event::TaskCompleted { .. }))
        .await;
    assert_eq!(started, vec!["clean", "copy"]);
    assert_eq!(completed, vec!["clean", "copy"]);
}
