//! Configuration loading and parsing.
//!
//! This module provides the YAML project file: manifest, tasks, default task
//! and watch rules.

mod builder;
mod error;
mod yaml;

pub use builder::{DEFAULT_PROJECT_FILE, Manifest, Project, ProjectBuilder, load_project};
pub use error::ConfigError;
pub use yaml::{
    ProcessConfig, ProjectConfig, ReplaceConfig, StepConfig, TaskConfig, TaskKindConfig,
    WatchConfig, YamlLoader,
};
