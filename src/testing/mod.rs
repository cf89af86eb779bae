//! Testing utilities for users of the brisk library.
//!
//! This module provides helpers for testing builds:
//!
//! - [`Journal`]: A shared log of action starts and finishes
//! - [`RecordingAction`]: An action that writes to a journal
//! - [`FailingAction`]: An action that fails N times then succeeds
//! - [`TestHarness`]: Runs tasks and asserts on the outcome

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::registry::TaskRegistry;
use crate::core::task::{Action, Step, TaskContext, TaskError};
use crate::core::types::TaskId;
use crate::execution::{Orchestrator, RunReport};

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// The named task's action started.
    Started(TaskId),
    /// The named task's action returned.
    Finished(TaskId),
}

/// Thread-safe, ordered log of action activity.
///
/// # Example
///
/// ```
/// use brisk::testing::{Journal, JournalEntry};
/// use brisk::TaskId;
///
/// let journal = Journal::new();
/// journal.record(JournalEntry::Started(TaskId::new("clean")));
/// journal.record(JournalEntry::Finished(TaskId::new("clean")));
/// assert_eq!(journal.start_count("clean"), 1);
/// ```
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl Journal {
    /// Create an empty, shareable journal.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append an entry.
    pub fn record(&self, entry: JournalEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Names of tasks in the order their actions started.
    pub fn started(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                JournalEntry::Started(id) => Some(id.as_str().to_string()),
                JournalEntry::Finished(_) => None,
            })
            .collect()
    }

    /// Number of times a task's action started.
    pub fn start_count(&self, task: &str) -> usize {
        self.started().iter().filter(|name| *name == task).count()
    }

    /// Position of an entry in the journal.
    pub fn position(&self, entry: &JournalEntry) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Check that `first` finished before `second` started.
    ///
    /// Returns false if either event is missing.
    pub fn finished_before(&self, first: &str, second: &str) -> bool {
        let finished = self.position(&JournalEntry::Finished(TaskId::new(first)));
        let started = self.position(&JournalEntry::Started(TaskId::new(second)));
        matches!((finished, started), (Some(f), Some(s)) if f < s)
    }
}

/// An action that records its start and finish, optionally sleeping in between.
pub struct RecordingAction {
    journal: Arc<Journal>,
    delay: Duration,
}

impl RecordingAction {
    /// Create an action that records into the given journal.
    pub fn new(journal: &Arc<Journal>) -> Self {
        Self {
            journal: Arc::clone(journal),
            delay: Duration::ZERO,
        }
    }

    /// Sleep for the given duration between start and finish.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.journal
            .record(JournalEntry::Started(ctx.task_id.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.journal
            .record(JournalEntry::Finished(ctx.task_id.clone()));
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some("record to journal".into())
    }
}

/// An action that fails a configurable number of times before succeeding.
///
/// # Example
///
/// ```
/// use brisk::testing::FailingAction;
///
/// // Always fails
/// let action = FailingAction::new("lint errors");
/// // Fails once, then succeeds
/// let flaky = FailingAction::new("transient").times(1);
/// ```
pub struct FailingAction {
    message: String,
    delay: Duration,
    state: Mutex<FailingActionState>,
}

struct FailingActionState {
    /// `None` means fail forever.
    failures_remaining: Option<u32>,
    call_count: u32,
}

impl FailingAction {
    /// Create an action that always fails with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            delay: Duration::ZERO,
            state: Mutex::new(FailingActionState {
                failures_remaining: None,
                call_count: 0,
            }),
        }
    }

    /// Fail only the first `count` calls.
    pub fn times(self, count: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failures_remaining = Some(count);
        }
        self
    }

    /// Sleep for the given duration before failing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times the action has been called.
    pub fn call_count(&self) -> u32 {
        self.state.lock().map(|s| s.call_count).unwrap_or(0)
    }

    fn next_outcome(&self) -> Result<(), TaskError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TaskError::ExecutionFailed("failing action state poisoned".into()))?;
        state.call_count += 1;
        match state.failures_remaining {
            None => Err(TaskError::ExecutionFailed(self.message.clone())),
            Some(0) => Ok(()),
            Some(n) => {
                state.failures_remaining = Some(n - 1);
                Err(TaskError::ExecutionFailed(self.message.clone()))
            }
        }
    }
}

#[async_trait]
impl Action for FailingAction {
    async fn run(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_outcome()
    }
}

/// A test harness for running tasks from a registry.
///
/// # Example
///
/// ```ignore
/// use brisk::testing::TestHarness;
///
/// let harness = TestHarness::new(registry).with_concurrency(2);
/// let report = harness.run_and_assert_success("build").await;
/// assert_eq!(report.completed_count(), 4);
/// ```
pub struct TestHarness {
    orchestrator: Orchestrator,
}

impl TestHarness {
    /// Create a harness over a registry.
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            orchestrator: Orchestrator::new(registry),
        }
    }

    /// Set the concurrency limit for action execution.
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.orchestrator = self.orchestrator.with_concurrency(max_concurrency);
        self
    }

    /// The underlying orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run a task and return the report.
    pub async fn run(&self, task: &str) -> RunReport {
        self.orchestrator.execute(&[Step::from(task)]).await
    }

    /// Run a task and assert success.
    pub async fn run_and_assert_success(&self, task: &str) -> RunReport {
        let report = self.run(task).await;
        assert!(
            report.success,
            "Expected '{}' to succeed, but it failed: {:?}",
            task, report.error
        );
        report
    }

    /// Run a task and assert failure.
    pub async fn run_and_assert_failure(&self, task: &str) -> RunReport {
        let report = self.run(task).await;
        assert!(!report.success, "Expected '{}' to fail, but it succeeded", task);
        report
    }
}
