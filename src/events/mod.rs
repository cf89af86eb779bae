//! Lifecycle events and event handling.
//!
//! This module provides event emission for run and task lifecycle events,
//! enabling observability into a build without coupling the orchestrator to
//! any particular output.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{RunId, TaskId};

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run has started.
    RunStarted {
        run_id: RunId,
        targets: Vec<TaskId>,
        timestamp: Instant,
    },

    /// A run finished (successfully or not).
    RunCompleted {
        run_id: RunId,
        success: bool,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task's action has started.
    TaskStarted {
        run_id: RunId,
        task_id: TaskId,
        timestamp: Instant,
    },

    /// A task completed successfully.
    TaskCompleted {
        run_id: RunId,
        task_id: TaskId,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task's action failed.
    TaskFailed {
        run_id: RunId,
        task_id: TaskId,
        error: String,
        timestamp: Instant,
    },

    /// A task never started because something it depends on failed.
    TaskSkipped {
        run_id: RunId,
        task_id: TaskId,
        reason: String,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::RunStarted { timestamp, .. }
            | Event::RunCompleted { timestamp, .. }
            | Event::TaskStarted { timestamp, .. }
            | Event::TaskCompleted { timestamp, .. }
            | Event::TaskFailed { timestamp, .. }
            | Event::TaskSkipped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the run the event belongs to.
    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::RunCompleted { run_id, .. }
            | Event::TaskStarted { run_id, .. }
            | Event::TaskCompleted { run_id, .. }
            | Event::TaskFailed { run_id, .. }
            | Event::TaskSkipped { run_id, .. } => *run_id,
        }
    }

    /// Get the task the event is about, if it is a task event.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskSkipped { task_id, .. } => Some(task_id),
            Event::RunStarted { .. } | Event::RunCompleted { .. } => None,
        }
    }

    /// Create a RunStarted event.
    pub fn run_started(run_id: RunId, targets: Vec<TaskId>) -> Self {
        Event::RunStarted {
            run_id,
            targets,
            timestamp: Instant::now(),
        }
    }

    /// Create a RunCompleted event.
    pub fn run_completed(run_id: RunId, success: bool, duration: Duration) -> Self {
        Event::RunCompleted {
            run_id,
            success,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStarted event.
    pub fn task_started(run_id: RunId, task_id: TaskId) -> Self {
        Event::TaskStarted {
            run_id,
            task_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskCompleted event.
    pub fn task_completed(run_id: RunId, task_id: TaskId, duration: Duration) -> Self {
        Event::TaskCompleted {
            run_id,
            task_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFailed event.
    pub fn task_failed(run_id: RunId, task_id: TaskId, error: String) -> Self {
        Event::TaskFailed {
            run_id,
            task_id,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskSkipped event.
    pub fn task_skipped(run_id: RunId, task_id: TaskId, reason: String) -> Self {
        Event::TaskSkipped {
            run_id,
            task_id,
            reason,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
