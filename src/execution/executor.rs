//! Action execution.
//!
//! The `ActionExecutor` runs a single task action with:
//! - Concurrency limiting via semaphore
//! - Synchronous bodies moved to the blocking pool
//! - Panics reported as task failures
//!
//! It never retries; retry policy belongs to the action itself.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::trace;

use crate::core::task::{Action, SyncFn, TaskContext, TaskError};

/// Executor for task action bodies with a concurrency limit.
#[derive(Debug)]
pub struct ActionExecutor {
    /// Maximum number of actions running at once.
    max_concurrency: usize,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
}

impl ActionExecutor {
    /// Create a new executor with the given concurrency limit (at least 1).
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            max_concurrency,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Get the maximum concurrency limit.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Get the number of available permits (slots for concurrent execution).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, TaskError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| TaskError::ExecutionFailed("executor is shut down".into()))
    }

    /// Run a synchronous action body on the blocking pool.
    pub async fn run_sync(&self, body: &SyncFn, ctx: &TaskContext) -> Result<(), TaskError> {
        let _permit = self.permit().await?;
        trace!(task = %ctx.task_id, "running sync action");

        let body = Arc::clone(body);
        let ctx = ctx.clone();
        match tokio::task::spawn_blocking(move || body(&ctx)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(panicked(e.into_panic())),
            Err(e) => Err(TaskError::ExecutionFailed(format!("action cancelled: {}", e))),
        }
    }

    /// Run an asynchronous action to completion.
    pub async fn run_async(&self, action: &dyn Action, ctx: &TaskContext) -> Result<(), TaskError> {
        let _permit = self.permit().await?;
        trace!(task = %ctx.task_id, "running async action");
        AssertUnwindSafe(action.run(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload)))
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> TaskError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    TaskError::ExecutionFailed(format!("action panicked: {}", message))
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(4) // Default to 4 concurrent actions
    }
}
