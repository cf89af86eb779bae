//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use brisk::{Event, EventBus, EventHandler, TaskAction, TaskRegistry};
use brisk::testing::{Journal, RecordingAction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Recording event handler for verifying events.
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Names of tasks in the order a given kind of event was seen.
    pub async fn tasks_where(&self, predicate: impl Fn(&Event) -> bool) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| predicate(e))
            .filter_map(|e| e.task_id().map(|id| id.as_str().to_string()))
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// Event bus with a single recording handler attached.
pub async fn recording_bus() -> (Arc<EventBus>, Arc<RecordingHandler>) {
    let bus = Arc::new(EventBus::new());
    let handler = RecordingHandler::new();
    bus.register(handler.clone()).await;
    (bus, handler)
}

/// Register a task whose action records into the journal.
pub fn record(registry: &mut TaskRegistry, journal: &Arc<Journal>, name: &str, deps: &[&str]) {
    registry
        .register(
            name,
            deps.iter().copied(),
            TaskAction::from_action(RecordingAction::new(journal)),
        )
        .unwrap();
}

/// Register a recording task that sleeps before finishing.
pub fn record_slow(
    registry: &mut TaskRegistry,
    journal: &Arc<Journal>,
    name: &str,
    deps: &[&str],
    delay: Duration,
) {
    registry
        .register(
            name,
            deps.iter().copied(),
            TaskAction::from_action(RecordingAction::new(journal).with_delay(delay)),
        )
        .unwrap();
}

/// Write a file below `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Read a file below `root`.
pub fn read_file(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("failed to read {}: {}", relative, e))
}
