//! Task actions and error types.
//!
//! A task's action is the opaque unit of work the orchestrator runs once the
//! task's dependencies have completed. The shape of the action is fixed when
//! the task is registered:
//!
//! - [`TaskAction::Sync`]: a plain function, complete when it returns
//! - [`TaskAction::Async`]: an [`Action`] whose future signals completion
//! - [`TaskAction::Alias`]: no work of its own, complete when its dependencies are
//! - [`TaskAction::Sequence`]: an ordered list of [`Step`]s over other tasks

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::types::{RunId, TaskId};

/// Errors that can occur while an action runs.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Action failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// External command exited unsuccessfully.
    #[error("command exited with code {code}")]
    CommandFailed { code: i32, stderr: String },

    /// Action ran longer than its own timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// File system operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Information handed to an action when it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The task being executed.
    pub task_id: TaskId,
    /// The run this execution belongs to.
    pub run_id: RunId,
}

impl TaskContext {
    pub fn new(task_id: TaskId, run_id: RunId) -> Self {
        Self { task_id, run_id }
    }
}

/// An awaitable unit of work.
///
/// Build plugins (style compilers, minifiers, copiers, archivers) implement
/// this trait to take part in a build.
///
/// # Example
///
/// ```ignore
/// use brisk::{Action, TaskContext, TaskError};
/// use async_trait::async_trait;
///
/// struct Touch(std::path::PathBuf);
///
/// #[async_trait]
/// impl Action for Touch {
///     async fn run(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
///         tokio::fs::write(&self.0, b"")
///             .await
///             .map_err(|e| TaskError::io(&self.0, e))
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action to completion.
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError>;

    /// Optional description for display/logging purposes.
    fn describe(&self) -> Option<String> {
        None
    }
}

/// Synchronous action body.
pub type SyncFn = Arc<dyn Fn(&TaskContext) -> Result<(), TaskError> + Send + Sync>;

/// One step of a sequence: a single task, or a group run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run one task (and its dependency tree).
    Task(TaskId),
    /// Run several tasks concurrently and wait for all of them.
    Group(Vec<TaskId>),
}

impl Step {
    /// Build a group step.
    pub fn group<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        Step::Group(tasks.into_iter().map(Into::into).collect())
    }

    /// Task names referenced by this step, in declaration order.
    pub fn task_ids(&self) -> &[TaskId] {
        match self {
            Step::Task(id) => std::slice::from_ref(id),
            Step::Group(ids) => ids,
        }
    }
}

impl From<&str> for Step {
    fn from(s: &str) -> Self {
        Step::Task(TaskId::new(s))
    }
}

impl From<TaskId> for Step {
    fn from(id: TaskId) -> Self {
        Step::Task(id)
    }
}

impl<const N: usize> From<[&str; N]> for Step {
    fn from(names: [&str; N]) -> Self {
        Step::group(names)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Task(id) => write!(f, "{}", id),
            Step::Group(ids) => {
                let names: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

/// The action attached to a task, tagged by shape at registration time.
#[derive(Clone)]
pub enum TaskAction {
    /// Synchronous function.
    Sync(SyncFn),
    /// Awaitable unit of work.
    Async(Arc<dyn Action>),
    /// Dependency-only task.
    Alias,
    /// Nested sequence of steps.
    Sequence(Vec<Step>),
}

impl TaskAction {
    /// Wrap a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        TaskAction::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous action.
    pub fn from_action(action: impl Action + 'static) -> Self {
        TaskAction::Async(Arc::new(action))
    }

    /// Build a sequence action.
    pub fn sequence<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        TaskAction::Sequence(steps.into_iter().map(Into::into).collect())
    }

    /// Short name of the shape, for display.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskAction::Sync(_) => "sync",
            TaskAction::Async(_) => "async",
            TaskAction::Alias => "alias",
            TaskAction::Sequence(_) => "sequence",
        }
    }

    /// Human-readable summary of what the action does, if it has one.
    pub fn describe(&self) -> Option<String> {
        match self {
            TaskAction::Async(action) => action.describe(),
            TaskAction::Sequence(steps) => Some(
                steps
                    .iter()
                    .map(|step| step.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            ),
            TaskAction::Sync(_) | TaskAction::Alias => None,
        }
    }

    /// Tasks referenced by a sequence action, in order.
    pub fn sequence_members(&self) -> impl Iterator<Item = &TaskId> {
        let steps: &[Step] = match self {
            TaskAction::Sequence(steps) => steps,
            _ => &[],
        };
        steps.iter().flat_map(|step| step.task_ids().iter())
    }
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Sync(_) => f.write_str("Sync"),
            TaskAction::Async(_) => f.write_str("Async"),
            TaskAction::Alias => f.write_str("Alias"),
            TaskAction::Sequence(steps) => f.debug_tuple("Sequence").field(steps).finish(),
        }
    }
}
