//! Project builder from YAML configuration.
//!
//! This module converts a [`ProjectConfig`] into a populated [`TaskRegistry`]
//! plus the manifest and watch rules. String fields are interpolated against
//! the manifest and relative paths are resolved against the project
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::registry::TaskRegistry;
use crate::core::task::{Step, TaskAction};
use crate::core::types::TaskId;
use crate::execution::{CleanAction, CommandAction, CommandActionBuilder, CopyAction, MkdirAction};
use crate::watch::WatchRule;

use super::error::ConfigError;
use super::yaml::{ProcessConfig, ProjectConfig, StepConfig, TaskKindConfig, YamlLoader};

/// Default project file name.
pub const DEFAULT_PROJECT_FILE: &str = "brisk.yaml";

/// Project metadata, read once and never changed.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub license: String,
    pub homepage: String,
    pub directories: BTreeMap<String, String>,
    pub vars: BTreeMap<String, String>,
    /// Directory relative paths are resolved against.
    pub root: PathBuf,
}

impl Manifest {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "name" => Some(self.name.as_str()),
            "version" => Some(self.version.as_str()),
            "license" => Some(self.license.as_str()),
            "homepage" => Some(self.homepage.as_str()),
            _ => {
                if let Some(dir) = key.strip_prefix("dirs.") {
                    self.directories.get(dir).map(String::as_str)
                } else if let Some(var) = key.strip_prefix("vars.") {
                    self.vars.get(var).map(String::as_str)
                } else {
                    None
                }
            }
        }
    }

    /// Substitute `{{...}}` placeholders.
    ///
    /// An opening `{{` without a closing `}}` is left as is.
    pub fn interpolate(&self, value: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let key = rest[start + 2..start + 2 + len].trim();
            let replacement = self
                .lookup(key)
                .ok_or_else(|| ConfigError::UnknownPlaceholder {
                    placeholder: key.to_string(),
                    value: value.to_string(),
                })?;

            out.push_str(&rest[..start]);
            out.push_str(replacement);
            rest = &rest[start + 2 + len + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Resolve a path against the project directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Resolve a named directory, if it is configured.
    pub fn dir(&self, key: &str) -> Option<PathBuf> {
        self.directories.get(key).map(|d| self.resolve_path(d))
    }

    fn interpolate_all(&self, values: &[String]) -> Result<Vec<String>, ConfigError> {
        values.iter().map(|v| self.interpolate(v)).collect()
    }
}

/// A loaded project.
#[derive(Debug)]
pub struct Project {
    pub manifest: Manifest,
    pub registry: TaskRegistry,
    pub max_concurrency: Option<usize>,
    pub watch: Vec<WatchRule>,
}

/// Builder for creating a project from YAML configuration.
pub struct ProjectBuilder;

impl ProjectBuilder {
    /// Build a project; `root` is the directory relative paths resolve against.
    pub fn build(config: ProjectConfig, root: impl Into<PathBuf>) -> Result<Project, ConfigError> {
        let manifest = Manifest {
            name: config.name,
            version: config.version,
            license: config.license,
            homepage: config.homepage,
            directories: config.directories,
            vars: config.vars,
            root: root.into(),
        };

        let mut registry = TaskRegistry::new();
        for task in &config.tasks {
            let action = Self::build_action(&manifest, &task.id, &task.kind)?;
            let definition = registry.register(task.id.as_str(), &task.depends_on, action)?;
            definition.description = task
                .description
                .as_deref()
                .map(|d| manifest.interpolate(d))
                .transpose()?;
        }

        if let Some(default) = &config.default {
            registry.set_default(default.as_str())?;
        }

        let watch = config
            .watch
            .iter()
            .map(|rule| {
                let paths = manifest.interpolate_all(&rule.paths)?;
                WatchRule::new(&paths, &rule.tasks)
                    .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Project {
            manifest,
            registry,
            max_concurrency: config.max_concurrency,
            watch,
        })
    }

    fn build_action(
        manifest: &Manifest,
        id: &str,
        kind: &TaskKindConfig,
    ) -> Result<TaskAction, ConfigError> {
        let action = match kind {
            TaskKindConfig::Command {
                program,
                args,
                options,
            } => {
                let builder =
                    CommandAction::builder(manifest.interpolate(program)?).args(manifest.interpolate_all(args)?);
                TaskAction::from_action(Self::process_options(manifest, builder, options)?)
            }
            TaskKindConfig::Shell { script, options } => {
                let builder = CommandAction::shell(manifest.interpolate(script)?);
                TaskAction::from_action(Self::process_options(manifest, builder, options)?)
            }
            TaskKindConfig::Copy {
                sources,
                dest,
                dot,
                base,
                replace,
                header,
                rename,
            } => {
                let sources = manifest.interpolate_all(sources)?;
                for source in &sources {
                    let pattern = source.strip_prefix('!').unwrap_or(source);
                    glob::Pattern::new(pattern).map_err(|e| {
                        ConfigError::InvalidConfig(format!(
                            "copy '{}': invalid glob pattern '{}': {}",
                            id, source, e
                        ))
                    })?;
                }

                let mut builder = CopyAction::builder(manifest.resolve_path(&manifest.interpolate(dest)?))
                    .root(&manifest.root)
                    .sources(sources)
                    .dot(*dot);
                if let Some(base) = base {
                    builder = builder.base(manifest.interpolate(base)?);
                }
                for replacement in replace {
                    builder = builder.replace(
                        replacement.from.as_str(),
                        manifest.interpolate(&replacement.to)?,
                    );
                }
                if let Some(header) = header {
                    builder = builder.header(manifest.interpolate(header)?);
                }
                if let Some(rename) = rename {
                    builder = builder.rename(manifest.interpolate(rename)?);
                }
                TaskAction::from_action(builder.build())
            }
            TaskKindConfig::Clean { paths } => {
                let paths = manifest
                    .interpolate_all(paths)?
                    .iter()
                    .map(|p| manifest.resolve_path(p))
                    .collect::<Vec<_>>();
                TaskAction::from_action(CleanAction::new(paths))
            }
            TaskKindConfig::Mkdir { path } => {
                TaskAction::from_action(MkdirAction::new(manifest.resolve_path(&manifest.interpolate(path)?)))
            }
            TaskKindConfig::Alias => TaskAction::Alias,
            TaskKindConfig::Sequence { steps } => TaskAction::Sequence(
                steps
                    .iter()
                    .map(|step| match step {
                        StepConfig::Single(name) => Step::Task(TaskId::new(name.as_str())),
                        StepConfig::Group(names) => Step::group(names),
                    })
                    .collect(),
            ),
        };
        Ok(action)
    }

    fn process_options(
        manifest: &Manifest,
        mut builder: CommandActionBuilder,
        options: &ProcessConfig,
    ) -> Result<CommandAction, ConfigError> {
        for (key, value) in &options.env {
            builder = builder.env(key.as_str(), manifest.interpolate(value)?);
        }

        let working_dir = match &options.working_dir {
            Some(dir) => manifest.resolve_path(&manifest.interpolate(dir)?),
            None => manifest.root.clone(),
        };
        builder = builder
            .working_dir(working_dir)
            .allow_failure(options.allow_failure);

        if let Some(secs) = options.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(builder.build())
    }
}

/// Load and build a project file.
///
/// Relative paths in the file resolve against the file's directory.
pub fn load_project(path: impl AsRef<Path>) -> Result<Project, ConfigError> {
    let path = path.as_ref();
    let config = YamlLoader::load_project(path)?;
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ProjectBuilder::build(config, root)
}
