//! File-system actions: copy, clean and mkdir.
//!
//! [`CopyAction`] selects files with glob patterns and writes them below a
//! destination directory, keeping each file's path relative to the base of
//! the pattern that matched it. Patterns starting with `!` exclude files.

use async_trait::async_trait;
use glob::{MatchOptions, Pattern, glob_with};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::task::{Action, TaskContext, TaskError};

/// A literal text substitution applied to copied files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// A source file and where it lands relative to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    pub source: PathBuf,
    pub relative: PathBuf,
}

/// Copies files matching glob patterns into a destination directory.
///
/// # Example
///
/// ```ignore
/// let action = CopyAction::builder("dist")
///     .source("src/**/*")
///     .source("!src/index.html")
///     .dot(true)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CopyAction {
    root: PathBuf,
    includes: Vec<String>,
    excludes: Vec<String>,
    dest: PathBuf,
    dot: bool,
    base: Option<PathBuf>,
    replacements: Vec<Replacement>,
    header: Option<String>,
    rename: Option<String>,
}

impl CopyAction {
    /// Create a new builder copying into `dest`.
    pub fn builder(dest: impl Into<PathBuf>) -> CopyActionBuilder {
        CopyActionBuilder::new(dest)
    }

    /// Get the destination directory.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: !self.dot,
        }
    }

    /// Expand the patterns into the files to copy.
    ///
    /// Files matched by several patterns are copied once, using the first
    /// pattern that matched them.
    pub fn entries(&self) -> Result<Vec<CopyEntry>, TaskError> {
        let options = self.match_options();
        let excludes = self
            .excludes
            .iter()
            .map(|p| {
                let full = without_cur_dir(&self.root.join(p));
                Pattern::new(&full.to_string_lossy()).map_err(|e| invalid_pattern(p, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for include in &self.includes {
            let full = without_cur_dir(&self.root.join(include));
            let base = match &self.base {
                Some(base) => without_cur_dir(&self.root.join(base)),
                None => glob_base(&full),
            };

            let paths = glob_with(&full.to_string_lossy(), options)
                .map_err(|e| invalid_pattern(include, e))?;
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(error = %e, "error reading path");
                        continue;
                    }
                };
                if !path.is_file()
                    || excludes.iter().any(|p| p.matches_path_with(&path, options))
                    || !seen.insert(path.clone())
                {
                    continue;
                }

                let relative = match path.strip_prefix(&base) {
                    Ok(rel) => rel.to_path_buf(),
                    Err(_) => PathBuf::from(path.file_name().unwrap_or_default()),
                };
                entries.push(CopyEntry {
                    source: path,
                    relative,
                });
            }
        }

        Ok(entries)
    }

    fn transforms_content(&self) -> bool {
        !self.replacements.is_empty() || self.header.is_some()
    }

    fn transform(&self, mut content: String) -> String {
        for replacement in &self.replacements {
            content = content.replace(&replacement.from, &replacement.to);
        }
        match &self.header {
            Some(header) => format!("{}{}", header, content),
            None => content,
        }
    }

    async fn copy_entry(&self, entry: &CopyEntry) -> Result<(), TaskError> {
        let mut target = self.dest.join(&entry.relative);
        if let Some(ref name) = self.rename {
            target.set_file_name(name);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::io(parent, e))?;
        }

        if self.transforms_content() {
            let content = tokio::fs::read_to_string(&entry.source)
                .await
                .map_err(|e| TaskError::io(&entry.source, e))?;
            tokio::fs::write(&target, self.transform(content))
                .await
                .map_err(|e| TaskError::io(&target, e))?;
        } else {
            tokio::fs::copy(&entry.source, &target)
                .await
                .map_err(|e| TaskError::io(&entry.source, e))?;
        }

        debug!(from = %entry.source.display(), to = %target.display(), "copied");
        Ok(())
    }
}

fn invalid_pattern(pattern: &str, err: glob::PatternError) -> TaskError {
    TaskError::ExecutionFailed(format!("invalid glob pattern '{}': {}", pattern, err))
}

fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Drop `.` components; glob yields matches without them.
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The leading part of a pattern that contains no glob characters.
///
/// For a literal path this is the file's parent directory.
pub fn glob_base(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        match component {
            Component::Normal(part) if has_glob_chars(&part.to_string_lossy()) => return base,
            other => base.push(other),
        }
    }
    base.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[async_trait]
impl Action for CopyAction {
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let this = self.clone();
        let entries = tokio::task::spawn_blocking(move || this.entries())
            .await
            .map_err(|e| TaskError::ExecutionFailed(format!("file discovery panicked: {}", e)))??;

        if entries.is_empty() {
            warn!(task = %ctx.task_id, patterns = ?self.includes, "no files matched");
            return Ok(());
        }

        for entry in &entries {
            self.copy_entry(entry).await?;
        }

        info!(task = %ctx.task_id, count = entries.len(), dest = %self.dest.display(), "copied files");
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(format!("copy to {}", self.dest.display()))
    }
}

/// Builder for creating `CopyAction` instances.
#[derive(Debug, Clone)]
pub struct CopyActionBuilder {
    action: CopyAction,
}

impl CopyActionBuilder {
    /// Create a new builder copying into `dest`.
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            action: CopyAction {
                root: PathBuf::new(),
                includes: Vec::new(),
                excludes: Vec::new(),
                dest: dest.into(),
                dot: false,
                base: None,
                replacements: Vec::new(),
                header: None,
                rename: None,
            },
        }
    }

    /// Directory relative patterns are resolved against.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.action.root = root.into();
        self
    }

    /// Add a source pattern; a leading `!` makes it an exclusion.
    pub fn source(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        match pattern.strip_prefix('!') {
            Some(excluded) => self.action.excludes.push(excluded.to_string()),
            None => self.action.includes.push(pattern),
        }
        self
    }

    /// Add several source patterns.
    pub fn sources<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns.into_iter().fold(self, |b, p| b.source(p))
    }

    /// Match hidden files.
    pub fn dot(mut self, dot: bool) -> Self {
        self.action.dot = dot;
        self
    }

    /// Directory that relative destination paths are computed from.
    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.action.base = Some(base.into());
        self
    }

    /// Replace every occurrence of `from` with `to` in copied files.
    pub fn replace(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.action.replacements.push(Replacement {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Prepend a banner to copied files.
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.action.header = Some(header.into());
        self
    }

    /// Give copied files a new file name.
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.action.rename = Some(name.into());
        self
    }

    /// Build the `CopyAction`.
    pub fn build(self) -> CopyAction {
        self.action
    }
}

/// Removes files and directories. Missing paths are not an error.
#[derive(Debug, Clone)]
pub struct CleanAction {
    paths: Vec<PathBuf>,
}

impl CleanAction {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the paths this action removes.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

#[async_trait]
impl Action for CleanAction {
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        for path in &self.paths {
            let metadata = match tokio::fs::symlink_metadata(path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(TaskError::io(path, e)),
            };

            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_file(path).await
            };
            match result {
                Ok(()) => debug!(task = %ctx.task_id, path = %path.display(), "removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(TaskError::io(path, e)),
            }
        }
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        let paths: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        Some(format!("remove {}", paths.join(", ")))
    }
}

/// Creates a directory and its parents.
#[derive(Debug, Clone)]
pub struct MkdirAction {
    path: PathBuf,
}

impl MkdirAction {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Action for MkdirAction {
    async fn run(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| TaskError::io(&self.path, e))
    }

    fn describe(&self) -> Option<String> {
        Some(format!("create {}", self.path.display()))
    }
}
