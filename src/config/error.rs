//! Configuration error types.
//!
//! This module defines error types for project file loading and validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::registry::RegistryError;

/// Errors that can occur when loading a project file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a specific file with context.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A `{{...}}` placeholder names nothing in the manifest.
    #[error("unknown placeholder '{{{{{placeholder}}}}}' in '{value}'")]
    UnknownPlaceholder { placeholder: String, value: String },

    /// Task registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
