//! Task execution engine.
//!
//! This module provides the execution infrastructure for running tasks,
//! including the built-in actions and run orchestration.

mod command;
mod executor;
mod fs;
mod orchestrator;

pub use command::{CommandAction, CommandActionBuilder};
pub use executor::ActionExecutor;
pub use fs::{CleanAction, CopyAction, CopyActionBuilder, CopyEntry, MkdirAction, Replacement, glob_base};
pub use orchestrator::{Orchestrator, RunError, RunReport, TaskStatus};
