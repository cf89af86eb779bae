//! Dependency resolution.
//!
//! Resolution turns a request for one or more tasks into an
//! [`ExecutionPlan`]: every task reachable through dependencies and sequence
//! members, in an order where each task appears after everything it refers
//! to. The walk is depth-first with a visiting/visited mark per task, so a
//! cycle is reported with the exact path that closes it.

use std::collections::HashMap;
use thiserror::Error;

use super::registry::TaskRegistry;
use super::types::TaskId;

/// Errors that can occur while resolving a request.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A requested task, dependency or sequence member is not registered.
    #[error("{}", unknown_task_message(.task, .required_by.as_ref()))]
    UnknownTask {
        task: TaskId,
        required_by: Option<TaskId>,
    },

    /// The graph contains a cycle; the path starts and ends on the same task.
    #[error("cyclic dependency: {}", format_cycle(.0))]
    CycleDetected(Vec<TaskId>),
}

fn unknown_task_message(task: &TaskId, required_by: Option<&TaskId>) -> String {
    match required_by {
        Some(from) => format!("unknown task '{}' (required by '{}')", task, from),
        None => format!("unknown task '{}'", task),
    }
}

fn format_cycle(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Resolved order for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Every reachable task, dependencies before dependents, each once.
    order: Vec<TaskId>,
    /// Depth of each task: 0 for leaves, otherwise one more than its deepest edge.
    depths: HashMap<TaskId, usize>,
}

impl ExecutionPlan {
    /// Tasks in topological order.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// Check whether a task is part of the plan.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.depths.contains_key(id)
    }

    /// Depth of a task within the plan.
    pub fn depth(&self, id: &TaskId) -> Option<usize> {
        self.depths.get(id).copied()
    }

    /// Tasks grouped by depth.
    ///
    /// Tasks on the same level never refer to each other and can be
    /// scheduled concurrently. Within a level, tasks keep plan order.
    pub fn levels(&self) -> Vec<Vec<TaskId>> {
        let max_depth = self.depths.values().copied().max();
        let mut levels = vec![Vec::new(); max_depth.map_or(0, |d| d + 1)];
        for id in &self.order {
            levels[self.depths[id]].push(id.clone());
        }
        levels
    }

    /// Number of tasks in the plan.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolve the given targets against the registry.
///
/// Fails before anything runs if any reachable name is unknown or if the
/// reachable graph has a cycle.
pub fn resolve(registry: &TaskRegistry, targets: &[TaskId]) -> Result<ExecutionPlan, ResolveError> {
    let mut resolver = Resolver {
        registry,
        marks: HashMap::new(),
        path: Vec::new(),
        order: Vec::new(),
        depths: HashMap::new(),
    };

    for target in targets {
        resolver.visit(target, None)?;
    }

    Ok(ExecutionPlan {
        order: resolver.order,
        depths: resolver.depths,
    })
}

struct Resolver<'a> {
    registry: &'a TaskRegistry,
    marks: HashMap<TaskId, Mark>,
    /// Current DFS path, used to report cycles.
    path: Vec<TaskId>,
    order: Vec<TaskId>,
    depths: HashMap<TaskId, usize>,
}

impl Resolver<'_> {
    fn visit(&mut self, id: &TaskId, required_by: Option<&TaskId>) -> Result<usize, ResolveError> {
        match self.marks.get(id) {
            Some(Mark::Visited) => return Ok(self.depths[id]),
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle: Vec<TaskId> = self.path[start..].to_vec();
                cycle.push(id.clone());
                return Err(ResolveError::CycleDetected(cycle));
            }
            None => {}
        }

        let registry = self.registry;
        let definition = registry
            .get(id)
            .ok_or_else(|| ResolveError::UnknownTask {
                task: id.clone(),
                required_by: required_by.cloned(),
            })?;

        self.marks.insert(id.clone(), Mark::Visiting);
        self.path.push(id.clone());

        let mut depth = 0;
        for edge in definition.edges() {
            let edge_depth = self.visit(edge, Some(id))?;
            depth = depth.max(edge_depth + 1);
        }

        self.path.pop();
        self.marks.insert(id.clone(), Mark::Visited);
        self.depths.insert(id.clone(), depth);
        self.order.push(id.clone());

        Ok(depth)
    }
}
