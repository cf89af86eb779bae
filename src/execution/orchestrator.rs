//! Run orchestration.
//!
//! The `Orchestrator` turns a request (a task, or a sequence of steps) into a
//! run: it resolves the request against the registry, then drives every task
//! in the plan with these rules:
//!
//! - A task's dependencies run as a group before its action starts
//! - Each task executes at most once per run; later requesters share the outcome
//! - Groups wait for every member to settle and report the first failure in
//!   declaration order
//! - Sequences run their steps strictly in order and stop at the first failure
//! - Tasks whose dependencies failed are skipped
//!
//! Nothing is cached between runs.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{Instrument, debug, debug_span, error, info, info_span, warn};

use crate::core::graph::{ExecutionPlan, ResolveError, resolve};
use crate::core::registry::TaskRegistry;
use crate::core::task::{Step, TaskAction, TaskContext, TaskError};
use crate::core::types::{RunId, TaskId};
use crate::events::{Event, EventBus};

use super::executor::ActionExecutor;

/// Errors that end a run.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// The request could not be resolved; nothing ran.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A task's action failed.
    #[error("task '{task}' failed: {source}")]
    ActionFailed {
        task: TaskId,
        #[source]
        source: Arc<TaskError>,
    },

    /// No task was requested and no default task is configured.
    #[error("no task requested and no default task configured")]
    NoDefaultTask,
}

impl RunError {
    fn action_failed(task: &TaskId, source: TaskError) -> Self {
        RunError::ActionFailed {
            task: task.clone(),
            source: Arc::new(source),
        }
    }

    /// The task whose action failed, if the error came from an action.
    pub fn task(&self) -> Option<&TaskId> {
        match self {
            RunError::ActionFailed { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// Status of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task has not started.
    Pending,
    /// Task's dependencies are done and its action is executing.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task's action failed.
    Failed,
    /// Task never started because a dependency failed.
    Skipped,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier of the run.
    pub run_id: RunId,
    /// Requested tasks, in request order.
    pub targets: Vec<TaskId>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Final status of each planned task.
    pub statuses: HashMap<TaskId, TaskStatus>,
    /// Tasks in the order they completed.
    pub completed: Vec<TaskId>,
    /// Every action failure observed during the run.
    pub failures: Vec<RunError>,
    /// The error reported to the caller.
    pub error: Option<RunError>,
}

impl RunReport {
    /// Convert into a `Result`, keeping the report on success.
    pub fn into_result(self) -> Result<RunReport, RunError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Get the status of a task, if it was part of the plan.
    pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.statuses.get(task_id).copied()
    }

    /// Get the number of completed tasks.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Get the number of failed actions.
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.statuses
            .values()
            .filter(|s| **s == TaskStatus::Skipped)
            .count()
    }
}

/// Runs tasks from a frozen registry.
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    executor: Arc<ActionExecutor>,
    event_bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// Create an orchestrator with the default concurrency limit.
    pub fn new(registry: impl Into<Arc<TaskRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            executor: Arc::new(ActionExecutor::default()),
            event_bus: None,
        }
    }

    /// Set the maximum number of actions executing at once.
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.executor = Arc::new(ActionExecutor::new(max_concurrency));
        self
    }

    /// Emit lifecycle events to the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// The registry this orchestrator runs from.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Resolve targets without running anything.
    pub fn plan(&self, targets: &[TaskId]) -> Result<ExecutionPlan, ResolveError> {
        resolve(&self.registry, targets)
    }

    /// Run one task and everything it depends on.
    pub async fn run(&self, task: impl Into<TaskId>) -> Result<RunReport, RunError> {
        self.execute(&[Step::Task(task.into())])
            .await
            .into_result()
    }

    /// Run the default task.
    pub async fn run_default(&self) -> Result<RunReport, RunError> {
        let task = self
            .registry
            .default_task()
            .cloned()
            .ok_or(RunError::NoDefaultTask)?;
        self.run(task).await
    }

    /// Run steps strictly in order, stopping at the first failure.
    pub async fn run_sequence(&self, steps: &[Step]) -> Result<RunReport, RunError> {
        self.execute(steps).await.into_result()
    }

    /// Execute steps in a new run and return the full report.
    ///
    /// Every step is resolved before any action starts; an unknown task or a
    /// cycle fails the run with nothing executed.
    pub async fn execute(&self, steps: &[Step]) -> RunReport {
        let run_id = RunId::new();
        let targets: Vec<TaskId> = steps
            .iter()
            .flat_map(|step| step.task_ids().iter().cloned())
            .collect();

        let span = info_span!("run", run = %run_id);
        self.execute_run(run_id, targets, steps)
            .instrument(span)
            .await
    }

    async fn execute_run(&self, run_id: RunId, targets: Vec<TaskId>, steps: &[Step]) -> RunReport {
        let start_time = Instant::now();
        self.emit(Event::run_started(run_id, targets.clone())).await;

        let plan = match resolve(&self.registry, &targets) {
            Ok(plan) => plan,
            Err(err) => {
                error!(error = %err, "could not resolve request");
                let duration = start_time.elapsed();
                self.emit(Event::run_completed(run_id, false, duration))
                    .await;
                return RunReport {
                    run_id,
                    targets,
                    success: false,
                    duration,
                    statuses: HashMap::new(),
                    completed: Vec::new(),
                    failures: Vec::new(),
                    error: Some(err.into()),
                };
            }
        };

        debug!(task_count = plan.len(), "resolved execution plan");

        let state = Arc::new(RunState {
            run_id,
            registry: Arc::clone(&self.registry),
            executor: Arc::clone(&self.executor),
            event_bus: self.event_bus.clone(),
            cells: plan
                .order()
                .iter()
                .map(|id| (id.clone(), OnceCell::new()))
                .collect(),
            statuses: RwLock::new(
                plan.order()
                    .iter()
                    .map(|id| (id.clone(), TaskStatus::Pending))
                    .collect(),
            ),
            completed: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        });

        let result = run_steps(&state, steps).await;
        let duration = start_time.elapsed();
        let success = result.is_ok();

        match &result {
            Ok(()) => info!(duration_ms = %duration.as_millis(), "run finished"),
            Err(err) => error!(duration_ms = %duration.as_millis(), error = %err, "run failed"),
        }

        self.emit(Event::run_completed(run_id, success, duration))
            .await;

        RunReport {
            run_id,
            targets,
            success,
            duration,
            statuses: state.statuses.read().await.clone(),
            completed: state.completed.lock().await.clone(),
            failures: state.failures.lock().await.clone(),
            error: result.err(),
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event).await;
        }
    }
}

/// Per-run state shared by every task future in the run.
struct RunState {
    run_id: RunId,
    registry: Arc<TaskRegistry>,
    executor: Arc<ActionExecutor>,
    event_bus: Option<Arc<EventBus>>,
    /// One completion cell per planned task.
    cells: HashMap<TaskId, OnceCell<Result<(), RunError>>>,
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
    completed: Mutex<Vec<TaskId>>,
    failures: Mutex<Vec<RunError>>,
}

impl RunState {
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) {
        self.statuses.write().await.insert(task_id.clone(), status);
    }

    async fn emit(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event).await;
        }
    }
}

async fn run_steps(state: &Arc<RunState>, steps: &[Step]) -> Result<(), RunError> {
    for step in steps {
        debug!(step = %step, "starting step");
        run_group(state, step.task_ids()).await?;
    }
    Ok(())
}

/// Run tasks concurrently and wait for all of them to settle.
async fn run_group(state: &Arc<RunState>, tasks: &[TaskId]) -> Result<(), RunError> {
    match tasks {
        [] => Ok(()),
        [single] => run_task(Arc::clone(state), single.clone()).await,
        _ => {
            let handles = tasks.iter().map(|id| {
                tokio::spawn(run_task(Arc::clone(state), id.clone()).in_current_span())
            });
            let results = join_all(handles).await;

            let mut first: Option<RunError> = None;
            for (id, joined) in tasks.iter().zip(results) {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(RunError::action_failed(
                        id,
                        TaskError::ExecutionFailed(format!("task panicked: {}", e)),
                    ))
                });
                let Err(err) = outcome else { continue };
                match &first {
                    None => first = Some(err),
                    Some(reported) if reported.task() == err.task() => {}
                    Some(_) => warn!(task = %id, error = %err, "additional failure in group"),
                }
            }

            first.map_or(Ok(()), Err)
        }
    }
}

/// Run a task once for this run; concurrent and later callers share the outcome.
fn run_task(state: Arc<RunState>, task_id: TaskId) -> BoxFuture<'static, Result<(), RunError>> {
    async move {
        let Some(cell) = state.cells.get(&task_id) else {
            return Err(RunError::Resolve(ResolveError::UnknownTask {
                task: task_id,
                required_by: None,
            }));
        };
        cell.get_or_init(|| execute_task(Arc::clone(&state), task_id.clone()))
            .await
            .clone()
    }
    .boxed()
}

async fn execute_task(state: Arc<RunState>, task_id: TaskId) -> Result<(), RunError> {
    let span = debug_span!("task", task = %task_id);
    execute_task_inner(state, task_id).instrument(span).await
}

async fn execute_task_inner(state: Arc<RunState>, task_id: TaskId) -> Result<(), RunError> {
    let registry = Arc::clone(&state.registry);
    let Some(definition) = registry.get(&task_id) else {
        return Err(RunError::Resolve(ResolveError::UnknownTask {
            task: task_id,
            required_by: None,
        }));
    };

    if let Err(err) = run_group(&state, &definition.dependencies).await {
        debug!(error = %err, "skipping task, dependency failed");
        state.set_status(&task_id, TaskStatus::Skipped).await;
        state
            .emit(Event::task_skipped(
                state.run_id,
                task_id.clone(),
                format!("dependency failed: {}", err),
            ))
            .await;
        return Err(err);
    }

    info!("starting '{}'", task_id);
    state.set_status(&task_id, TaskStatus::Running).await;
    state
        .emit(Event::task_started(state.run_id, task_id.clone()))
        .await;

    let ctx = TaskContext::new(task_id.clone(), state.run_id);
    let task_start = Instant::now();
    let result = match &definition.action {
        TaskAction::Alias => Ok(()),
        TaskAction::Sync(body) => state
            .executor
            .run_sync(body, &ctx)
            .await
            .map_err(|e| RunError::action_failed(&task_id, e)),
        TaskAction::Async(action) => state
            .executor
            .run_async(action.as_ref(), &ctx)
            .await
            .map_err(|e| RunError::action_failed(&task_id, e)),
        TaskAction::Sequence(steps) => run_steps(&state, steps).await,
    };
    let duration = task_start.elapsed();

    match result {
        Ok(()) => {
            info!(duration_ms = %duration.as_millis(), "finished '{}'", task_id);
            state.set_status(&task_id, TaskStatus::Completed).await;
            state.completed.lock().await.push(task_id.clone());
            state
                .emit(Event::task_completed(state.run_id, task_id, duration))
                .await;
            Ok(())
        }
        Err(err) => {
            // Sequence members record their own failures.
            if !matches!(definition.action, TaskAction::Sequence(_)) {
                error!(error = %err, "'{}' errored after {}ms", task_id, duration.as_millis());
                state.failures.lock().await.push(err.clone());
            }
            state.set_status(&task_id, TaskStatus::Failed).await;
            state
                .emit(Event::task_failed(state.run_id, task_id, err.to_string()))
                .await;
            Err(err)
        }
    }
}
