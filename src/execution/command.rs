//! External command actions.
//!
//! [`CommandAction`] runs an external program as a task action. Style
//! compilers, minifiers, image optimizers and archivers are all reached
//! this way: the build only cares whether the process exits successfully.
//!
//! # Quick Start
//!
//! ```rust
//! use brisk::CommandAction;
//! use std::time::Duration;
//!
//! // Simple command
//! let action = CommandAction::builder("eslint")
//!     .args(["src/js/main.js", "src/js/plugins.js"])
//!     .build();
//!
//! // Shell script with a timeout
//! let zip = CommandAction::shell("cd dist && zip -r ../archive/site.zip .")
//!     .timeout(Duration::from_secs(120))
//!     .build();
//! ```
//!
//! # Error Handling
//!
//! - **Non-zero exit code**: [`TaskError::CommandFailed`] with the exit code
//!   and captured stderr
//! - **Timeout**: [`TaskError::Timeout`]; the child is killed
//! - **Spawn failure**: [`TaskError::ExecutionFailed`] (e.g. program not found)
//!
//! With `allow_failure`, a non-zero exit or timeout is logged as a warning
//! and the action succeeds. Lint steps that should report but never break
//! the build use this.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::task::{Action, TaskContext, TaskError};

/// An action that executes an external command.
///
/// # Example
///
/// ```ignore
/// let action = CommandAction::builder("sass")
///     .arg("src/css/main.scss")
///     .arg("dist/css/main.css")
///     .env("SASS_PATH", "node_modules")
///     .working_dir("/srv/site")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CommandAction {
    /// Program to execute
    program: String,
    /// Command arguments
    args: Vec<String>,
    /// Environment variables
    env: BTreeMap<String, String>,
    /// Working directory
    working_dir: Option<PathBuf>,
    /// Execution timeout
    timeout: Option<Duration>,
    /// Treat failure as a warning
    allow_failure: bool,
}

impl CommandAction {
    /// Create a new builder for a command action.
    pub fn builder(program: impl Into<String>) -> CommandActionBuilder {
        CommandActionBuilder::new(program)
    }

    /// Create a builder that runs a script through `sh -c`.
    pub fn shell(script: impl Into<String>) -> CommandActionBuilder {
        CommandActionBuilder::new("sh").arg("-c").arg(script)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether a failing command is tolerated.
    pub fn allow_failure(&self) -> bool {
        self.allow_failure
    }

    async fn execute(&self) -> Result<(), TaskError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| TaskError::Timeout(duration))?
                .map_err(|e| spawn_error(&self.program, e))?,
            None => cmd
                .output()
                .await
                .map_err(|e| spawn_error(&self.program, e))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        for line in stdout.lines() {
            debug!(target: "brisk::command", "{}", line);
        }

        if output.status.success() {
            for line in stderr.lines() {
                debug!(target: "brisk::command", "{}", line);
            }
            Ok(())
        } else {
            Err(TaskError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> TaskError {
    TaskError::ExecutionFailed(format!("failed to start '{}': {}", program, err))
}

#[async_trait]
impl Action for CommandAction {
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        debug!(task = %ctx.task_id, program = %self.program, args = ?self.args, "spawning command");

        match self.execute().await {
            Err(err @ (TaskError::CommandFailed { .. } | TaskError::Timeout(_)))
                if self.allow_failure =>
            {
                if let TaskError::CommandFailed { ref stderr, .. } = err {
                    for line in stderr.lines() {
                        warn!(task = %ctx.task_id, "{}", line);
                    }
                }
                warn!(task = %ctx.task_id, error = %err, "command failed, continuing");
                Ok(())
            }
            other => other,
        }
    }

    fn describe(&self) -> Option<String> {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        Some(parts.join(" "))
    }
}

/// Builder for creating `CommandAction` instances.
#[derive(Debug, Clone)]
pub struct CommandActionBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    allow_failure: bool,
}

impl CommandActionBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: None,
            allow_failure: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Log failures as warnings instead of failing the task.
    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.allow_failure = allow;
        self
    }

    /// Build the `CommandAction`.
    pub fn build(self) -> CommandAction {
        CommandAction {
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
            allow_failure: self.allow_failure,
        }
    }
}
