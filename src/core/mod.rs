//! Core types: identifiers, actions, the task registry and dependency resolution.

pub mod graph;
pub mod registry;
pub mod task;
pub mod types;
