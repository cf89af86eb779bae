//! Task registry.
//!
//! The registry holds every task definition for the process. It is populated
//! once at startup through registration calls and then shared read-only with
//! the orchestrator; runs never mutate it.

use std::collections::HashMap;
use thiserror::Error;

use super::task::{Step, TaskAction};
use super::types::TaskId;

/// Errors raised while registering tasks.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A task with the same name is already registered.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// The task name is empty.
    #[error("invalid task name: {0:?}")]
    InvalidName(String),

    /// A different task is already the default.
    #[error("default task already set to '{existing}', cannot set '{requested}'")]
    DefaultAlreadySet { existing: TaskId, requested: TaskId },
}

/// A registered task.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// The task name.
    pub id: TaskId,
    /// Tasks that must complete before this task's action runs, in declaration order.
    pub dependencies: Vec<TaskId>,
    /// The task's action.
    pub action: TaskAction,
    /// Optional human-readable description.
    pub description: Option<String>,
}

impl TaskDefinition {
    /// Every task this definition refers to: dependencies first, then sequence members.
    pub fn edges(&self) -> impl Iterator<Item = &TaskId> {
        self.dependencies
            .iter()
            .chain(self.action.sequence_members())
    }
}

/// Registry of task definitions.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskDefinition>,
    /// Registration order.
    order: Vec<TaskId>,
    default_task: Option<TaskId>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Dependencies may name tasks that are not registered yet; they are
    /// checked when a run is resolved.
    pub fn register<I, S>(
        &mut self,
        name: impl Into<TaskId>,
        dependencies: I,
        action: TaskAction,
    ) -> Result<&mut TaskDefinition, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        let id = name.into();
        if id.is_blank() {
            return Err(RegistryError::InvalidName(id.as_str().to_string()));
        }
        if self.tasks.contains_key(&id) {
            return Err(RegistryError::DuplicateTask(id));
        }

        let definition = TaskDefinition {
            id: id.clone(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action,
            description: None,
        };

        self.order.push(id.clone());
        Ok(self.tasks.entry(id).or_insert(definition))
    }

    /// Register a task with no action of its own.
    pub fn alias<I, S>(
        &mut self,
        name: impl Into<TaskId>,
        dependencies: I,
    ) -> Result<&mut TaskDefinition, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.register(name, dependencies, TaskAction::Alias)
    }

    /// Register a task whose action runs other tasks in order.
    pub fn sequence<D, S, P, T>(
        &mut self,
        name: impl Into<TaskId>,
        dependencies: D,
        steps: P,
    ) -> Result<&mut TaskDefinition, RegistryError>
    where
        D: IntoIterator<Item = S>,
        S: Into<TaskId>,
        P: IntoIterator<Item = T>,
        T: Into<Step>,
    {
        self.register(name, dependencies, TaskAction::sequence(steps))
    }

    /// Designate the task run when none is requested.
    ///
    /// Setting the same default twice is allowed; switching to another task is not.
    pub fn set_default(&mut self, name: impl Into<TaskId>) -> Result<(), RegistryError> {
        let requested = name.into();
        match &self.default_task {
            Some(existing) if *existing != requested => Err(RegistryError::DefaultAlreadySet {
                existing: existing.clone(),
                requested,
            }),
            _ => {
                self.default_task = Some(requested);
                Ok(())
            }
        }
    }

    /// The designated default task, if any.
    pub fn default_task(&self) -> Option<&TaskId> {
        self.default_task.as_ref()
    }

    /// Look up a task definition.
    pub fn get(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    /// Check whether a task is registered.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Task names in registration order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Task definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
