//! Watch mode for re-running tasks on file changes.
//!
//! A [`Watcher`] observes the project directory recursively, debounces
//! file-system events and matches the changed paths (relative to the project
//! directory) against each [`WatchRule`]. Every rule that matches runs its
//! tasks as a sequence in a fresh run. Failures are logged and watching
//! continues until Ctrl+C, which also abandons a rebuild in progress.

use glob::{MatchOptions, Pattern};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, new_debouncer};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::task::Step;
use crate::core::types::TaskId;
use crate::execution::Orchestrator;

/// Errors that stop watch mode.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize the file watcher.
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    /// Failed to watch the project directory.
    #[error("failed to watch '{path}': {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The project directory does not exist.
    #[error("watch root '{path}' not found: {source}")]
    RootNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rule pattern is not a valid glob.
    #[error("invalid watch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// There is nothing to watch.
    #[error("no watch rules configured")]
    NoRules,

    /// The event channel closed unexpectedly.
    #[error("watch event channel closed")]
    ChannelClosed,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Glob patterns mapped to the tasks they trigger.
#[derive(Debug, Clone)]
pub struct WatchRule {
    patterns: Vec<Pattern>,
    tasks: Vec<TaskId>,
}

impl WatchRule {
    /// Create a rule from patterns relative to the project directory.
    pub fn new<P, S, T, U>(patterns: P, tasks: T) -> Result<Self, WatchError>
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
        T: IntoIterator<Item = U>,
        U: Into<TaskId>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|source| WatchError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            tasks: tasks.into_iter().map(Into::into).collect(),
        })
    }

    /// The rule's patterns.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    /// Tasks run when the rule matches.
    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    /// Check a path relative to the project directory.
    pub fn matches(&self, relative: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
    }

    /// The rule's tasks as sequence steps.
    pub fn steps(&self) -> Vec<Step> {
        self.tasks.iter().cloned().map(Step::Task).collect()
    }
}

/// Rules triggered by a batch of changed paths, in declaration order.
///
/// Paths outside `root` are ignored; a rule appears at most once.
pub fn triggered<'a>(rules: &'a [WatchRule], root: &Path, changed: &[PathBuf]) -> Vec<&'a WatchRule> {
    let relative: Vec<&Path> = changed
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .collect();

    rules
        .iter()
        .filter(|rule| relative.iter().any(|p| rule.matches(p)))
        .collect()
}

/// Debounced recursive watcher over a project directory.
pub struct Watcher {
    root: PathBuf,
    rules: Vec<WatchRule>,
    debounce: Duration,
}

impl Watcher {
    /// Create a watcher with the default 200ms debounce.
    pub fn new(root: impl Into<PathBuf>, rules: Vec<WatchRule>) -> Self {
        Self {
            root: root.into(),
            rules,
            debounce: Duration::from_millis(200),
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Watch until Ctrl+C, running matching rules through the orchestrator.
    pub async fn run(&self, orchestrator: &Orchestrator) -> Result<(), WatchError> {
        self.run_until(orchestrator, async {
            // A failed signal handler install still stops the watch.
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Watch until `shutdown` resolves. A rebuild in progress is abandoned.
    pub async fn run_until<F>(&self, orchestrator: &Orchestrator, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        if self.rules.is_empty() {
            return Err(WatchError::NoRules);
        }

        let root = std::fs::canonicalize(&self.root).map_err(|source| WatchError::RootNotFound {
            path: self.root.clone(),
            source,
        })?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            // The receiver is gone only when watching has stopped.
            let _ = tx.send(result);
        })
        .map_err(WatchError::WatcherInit)?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath {
                path: root.clone(),
                source,
            })?;

        info!(root = %root.display(), rules = self.rules.len(), "watching for changes");

        tokio::pin!(shutdown);

        loop {
            let received = tokio::select! {
                _ = shutdown.as_mut() => {
                    info!("stopping watch");
                    return Ok(());
                }
                received = rx.recv() => received,
            };

            match received {
                None => return Err(WatchError::ChannelClosed),
                Some(Err(e)) => warn!(error = %e, "watch error"),
                Some(Ok(events)) => {
                    let changed: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path)
                        .collect();
                    debug!(count = changed.len(), "paths changed");
                    if self
                        .rebuild_until(orchestrator, &root, &changed, shutdown.as_mut())
                        .await
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run triggered rules unless `shutdown` resolves first; returns true on shutdown.
    async fn rebuild_until<F>(
        &self,
        orchestrator: &Orchestrator,
        root: &Path,
        changed: &[PathBuf],
        shutdown: Pin<&mut F>,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                info!("stopping watch, abandoning rebuild");
                true
            }
            _ = self.run_triggered(orchestrator, root, changed) => false,
        }
    }

    async fn run_triggered(&self, orchestrator: &Orchestrator, root: &Path, changed: &[PathBuf]) {
        for rule in triggered(&self.rules, root, changed) {
            match orchestrator.run_sequence(&rule.steps()).await {
                Ok(report) => info!(
                    tasks = ?rule.tasks(),
                    duration_ms = %report.duration.as_millis(),
                    "rebuilt"
                ),
                Err(err) => error!(tasks = ?rule.tasks(), error = %err, "rebuild failed"),
            }
        }
    }
}
