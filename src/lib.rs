//! brisk - a declarative task-dependency build orchestrator.
//!
//! Tasks are registered with their dependencies and an action. Requesting a
//! task resolves its dependency tree, then runs every action once, with
//! independent tasks running concurrently and dependents waiting for what
//! they need.
//!
//! # Example
//!
//! ```ignore
//! use brisk::{CleanAction, Orchestrator, Step, TaskAction, TaskRegistry};
//!
//! let mut registry = TaskRegistry::new();
//! registry.register("clean", Vec::<&str>::new(), TaskAction::from_action(CleanAction::new(["dist"])))?;
//! registry.sequence("build", Vec::<&str>::new(), [Step::group(["clean", "lint:js"]), Step::from("copy")])?;
//! registry.alias("default", ["build"])?;
//! registry.set_default("default")?;
//!
//! let report = Orchestrator::new(registry).run_default().await?;
//! ```

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod testing;
pub mod watch;

pub use config::{
    ConfigError, DEFAULT_PROJECT_FILE, Manifest, Project, ProjectBuilder, YamlLoader, load_project,
};
pub use core::graph::{ExecutionPlan, ResolveError, resolve};
pub use core::registry::{RegistryError, TaskDefinition, TaskRegistry};
pub use core::task::{Action, Step, SyncFn, TaskAction, TaskContext, TaskError};
pub use core::types::{RunId, TaskId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    ActionExecutor, CleanAction, CommandAction, CommandActionBuilder, CopyAction,
    CopyActionBuilder, MkdirAction, Orchestrator, RunError, RunReport, TaskStatus,
};
pub use watch::{WatchError, WatchRule, Watcher};
