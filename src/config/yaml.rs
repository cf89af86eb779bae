//! YAML configuration parsing.
//!
//! Parses the project file: manifest, task declarations, default task and
//! watch rules.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::ConfigError;

/// Project file (brisk.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Project version.
    #[serde(default, deserialize_with = "scalar")]
    pub version: String,
    /// License identifier.
    #[serde(default)]
    pub license: String,
    /// Project homepage.
    #[serde(default)]
    pub homepage: String,
    /// Named directories (`src`, `dist`, `test`, `archive`, ...).
    #[serde(default, deserialize_with = "scalar_map")]
    pub directories: BTreeMap<String, String>,
    /// Free-form variables.
    #[serde(default, deserialize_with = "scalar_map")]
    pub vars: BTreeMap<String, String>,
    /// Task run when none is requested.
    pub default: Option<String>,
    /// Maximum number of actions executing at once.
    pub max_concurrency: Option<usize>,
    /// Task definitions.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    /// Watch rules.
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

/// Task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name (unique within the project).
    pub id: String,
    /// Optional description.
    pub description: Option<String>,
    /// Tasks that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Action type and its settings.
    #[serde(flatten)]
    pub kind: TaskKindConfig,
}

/// Action type configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKindConfig {
    /// External program.
    Command {
        /// Program to run.
        program: String,
        /// Program arguments.
        #[serde(default)]
        args: Vec<String>,
        #[serde(flatten)]
        options: ProcessConfig,
    },
    /// Script run through `sh -c`.
    Shell {
        /// Script text.
        script: String,
        #[serde(flatten)]
        options: ProcessConfig,
    },
    /// Copy files matching glob patterns.
    Copy {
        /// Source patterns; `!` excludes.
        sources: Vec<String>,
        /// Destination directory.
        dest: String,
        /// Match hidden files.
        #[serde(default)]
        dot: bool,
        /// Directory relative paths are computed from.
        base: Option<String>,
        /// Literal substitutions.
        #[serde(default)]
        replace: Vec<ReplaceConfig>,
        /// Banner prepended to each file.
        header: Option<String>,
        /// New file name for copied files.
        rename: Option<String>,
    },
    /// Remove paths.
    Clean {
        /// Paths to remove.
        paths: Vec<String>,
    },
    /// Create a directory.
    Mkdir {
        /// Directory to create.
        path: String,
    },
    /// No action of its own.
    Alias,
    /// Run steps in order.
    Sequence {
        /// Steps; a list inside the list is a concurrent group.
        steps: Vec<StepConfig>,
    },
}

impl TaskKindConfig {
    /// Name of the `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            TaskKindConfig::Command { .. } => "command",
            TaskKindConfig::Shell { .. } => "shell",
            TaskKindConfig::Copy { .. } => "copy",
            TaskKindConfig::Clean { .. } => "clean",
            TaskKindConfig::Mkdir { .. } => "mkdir",
            TaskKindConfig::Alias => "alias",
            TaskKindConfig::Sequence { .. } => "sequence",
        }
    }
}

/// Settings shared by `command` and `shell` tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; defaults to the project directory.
    pub working_dir: Option<String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Log failure as a warning and succeed.
    #[serde(default)]
    pub allow_failure: bool,
}

/// A literal substitution for `copy` tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceConfig {
    /// Text to find; used verbatim, never interpolated.
    pub from: String,
    /// Replacement text.
    pub to: String,
}

/// One sequence step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// A single task.
    Single(String),
    /// Tasks run concurrently.
    Group(Vec<String>),
}

/// Watch rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns, relative to the project directory.
    pub paths: Vec<String>,
    /// Tasks run, in order, when a matching file changes.
    pub tasks: Vec<String>,
}

/// Stringify a YAML scalar.
///
/// Numbers and booleans are written as YAML reads them, so `1.10` becomes
/// `"1.1"`; quote a value to keep it verbatim.
fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(format!("expected a scalar value, found {:?}", other)),
    }
}

fn scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(serde::de::Error::custom)
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|v| (key.clone(), v))
                .map_err(|e| serde::de::Error::custom(format!("'{}': {}", key, e)))
        })
        .collect()
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a project file.
    pub fn load_project(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ProjectConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_project(&config)?;
        Ok(config)
    }

    /// Parse a project from a YAML string.
    pub fn parse_project(yaml: &str) -> Result<ProjectConfig, ConfigError> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        Self::validate_project(&config)?;
        Ok(config)
    }

    /// Validate a project configuration.
    ///
    /// Dependency names are not checked here; unknown tasks fail the run
    /// that reaches them.
    fn validate_project(config: &ProjectConfig) -> Result<(), ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }

        if config.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }

        for (index, task) in config.tasks.iter().enumerate() {
            if task.id.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("tasks[{}].id", index)));
            }

            match &task.kind {
                TaskKindConfig::Sequence { steps } => {
                    if steps.is_empty() {
                        return Err(ConfigError::InvalidConfig(format!(
                            "sequence '{}' has no steps",
                            task.id
                        )));
                    }
                    for step in steps {
                        if let StepConfig::Group(members) = step {
                            if members.is_empty() {
                                return Err(ConfigError::InvalidConfig(format!(
                                    "sequence '{}' has an empty group",
                                    task.id
                                )));
                            }
                        }
                    }
                }
                TaskKindConfig::Copy { sources, .. } => {
                    if !sources.iter().any(|s| !s.starts_with('!')) {
                        return Err(ConfigError::InvalidConfig(format!(
                            "copy '{}' has no source patterns",
                            task.id
                        )));
                    }
                }
                TaskKindConfig::Clean { paths } if paths.is_empty() => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "clean '{}' has no paths",
                        task.id
                    )));
                }
                _ => {}
            }
        }

        for (index, rule) in config.watch.iter().enumerate() {
            if rule.paths.is_empty() || rule.tasks.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "watch[{}] needs at least one path and one task",
                    index
                )));
            }
        }

        Ok(())
    }
}
