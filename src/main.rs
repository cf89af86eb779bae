//! brisk - a declarative task-dependency build orchestrator.
//!
//! Usage:
//!   brisk run [TASK]...   Run tasks (the default task when none is given)
//!   brisk list            List the project's tasks
//!   brisk plan [TASK]     Show the resolved execution order
//!   brisk validate        Check that every task resolves
//!   brisk watch           Re-run tasks when files change

use brisk::{
    DEFAULT_PROJECT_FILE, Event, EventBus, EventHandler, Orchestrator, Project, RunError,
    RunReport, Step, TaskId, Watcher, load_project, resolve,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// brisk - a declarative task-dependency build orchestrator
#[derive(Parser)]
#[command(name = "brisk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the project file
    #[arg(short = 'f', long = "file", value_name = "FILE", default_value = DEFAULT_PROJECT_FILE)]
    file: PathBuf,

    /// Maximum concurrent actions (overrides the project file)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks; several tasks run one after another
    Run {
        /// Tasks to run (default task when omitted)
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },

    /// List all tasks in the project
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved execution order of a task
    Plan {
        /// Task to plan (default task when omitted)
        #[arg(value_name = "TASK")]
        task: Option<String>,
    },

    /// Check that every task and dependency resolves
    Validate,

    /// Watch the project and re-run tasks on changes
    Watch,
}

/// Event handler that logs run and task events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::RunStarted { targets, .. } => {
                let names: Vec<&str> = targets.iter().map(TaskId::as_str).collect();
                info!("Using tasks: {}", names.join(", "));
            }
            Event::RunCompleted {
                success, duration, ..
            } => {
                if *success {
                    info!("Run finished in {:?}", duration);
                } else {
                    error!("Run failed after {:?}", duration);
                }
            }
            Event::TaskFailed { task_id, error, .. } => {
                warn!("  Task '{}' failed: {}", task_id, error);
            }
            Event::TaskSkipped {
                task_id, reason, ..
            } => {
                warn!("  Task '{}' skipped: {}", task_id, reason);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { tasks } => run_tasks(&cli.file, cli.jobs, tasks).await,
        Commands::List { json } => list_tasks(&cli.file, json),
        Commands::Plan { task } => plan_task(&cli.file, task),
        Commands::Validate => validate_project(&cli.file),
        Commands::Watch => watch_project(&cli.file, cli.jobs).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(file: &Path) -> Result<Project, Box<dyn std::error::Error>> {
    let project = load_project(file)?;
    info!(
        "Loaded '{}' {} ({} task(s))",
        project.manifest.name,
        project.manifest.version,
        project.registry.len()
    );
    Ok(project)
}

async fn orchestrator(project: Project, jobs: Option<usize>) -> Orchestrator {
    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut orchestrator = Orchestrator::new(project.registry).with_event_bus(event_bus);
    if let Some(max) = jobs.or(project.max_concurrency) {
        orchestrator = orchestrator.with_concurrency(max);
    }
    orchestrator
}

/// Run the requested tasks and report the first failure.
async fn run_tasks(
    file: &Path,
    jobs: Option<usize>,
    tasks: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = load(file)?;
    let orchestrator = orchestrator(project, jobs).await;

    let result = match tasks.as_slice() {
        [] => orchestrator.run_default().await,
        [task] => orchestrator.run(task.as_str()).await,
        _ => {
            let steps: Vec<Step> = tasks.iter().map(|t| Step::from(t.as_str())).collect();
            orchestrator.run_sequence(&steps).await
        }
    };

    match result {
        Ok(report) => {
            summarize(&report);
            Ok(())
        }
        Err(e) => Err(describe_failure(&e).into()),
    }
}

fn summarize(report: &RunReport) {
    info!(
        "{} task(s) completed in {:?}",
        report.completed_count(),
        report.duration
    );
}

fn describe_failure(err: &RunError) -> String {
    match err.task() {
        Some(task) => format!("error: task '{}' failed\n{}", task, err),
        None => format!("error: {}", err),
    }
}

#[derive(Serialize)]
struct TaskSummary<'a> {
    name: &'a TaskId,
    kind: &'static str,
    dependencies: &'a [TaskId],
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    default: bool,
}

/// List tasks in registration order.
fn list_tasks(file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let project = load_project(file)?;
    let registry = &project.registry;
    let default = registry.default_task();

    let summaries: Vec<TaskSummary<'_>> = registry
        .definitions()
        .map(|def| TaskSummary {
            name: &def.id,
            kind: def.action.kind(),
            dependencies: &def.dependencies,
            description: def.description.as_deref(),
            action: def.action.describe(),
            default: default == Some(&def.id),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Tasks in {}:", project.manifest.name);
    println!();

    for task in &summaries {
        let marker = if task.default { " (default)" } else { "" };
        println!("{} [{}]{}", task.name, task.kind, marker);
        if let Some(description) = task.description {
            println!("  {}", description);
        }
        if !task.dependencies.is_empty() {
            let deps: Vec<&str> = task.dependencies.iter().map(TaskId::as_str).collect();
            println!("  depends on: {}", deps.join(", "));
        }
        if let Some(ref action) = task.action {
            println!("  runs: {}", action);
        }
    }

    Ok(())
}

/// Print the resolved order and depth levels of a task.
fn plan_task(file: &Path, task: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let project = load_project(file)?;
    let target = match task {
        Some(task) => TaskId::new(task),
        None => project
            .registry
            .default_task()
            .cloned()
            .ok_or(RunError::NoDefaultTask)?,
    };

    let plan = resolve(&project.registry, std::slice::from_ref(&target))?;

    println!("Plan for '{}' ({} task(s)):", target, plan.len());
    for (i, task_id) in plan.order().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, task_id);
    }
    println!();
    println!("Levels:");
    for (depth, level) in plan.levels().iter().enumerate() {
        let names: Vec<&str> = level.iter().map(TaskId::as_str).collect();
        println!("  {}: {}", depth, names.join(", "));
    }

    Ok(())
}

/// Resolve every registered task without running anything.
fn validate_project(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating {}", file.display());

    let project = load_project(file)?;
    let all: Vec<TaskId> = project.registry.task_ids().to_vec();

    match resolve(&project.registry, &all) {
        Ok(_) => {
            info!("All {} task(s) are valid", all.len());
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Watch the project directory until Ctrl+C.
async fn watch_project(
    file: &Path,
    jobs: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut project = load(file)?;
    let root = project.manifest.root.clone();
    let rules = std::mem::take(&mut project.watch);

    let orchestrator = orchestrator(project, jobs).await;
    let watcher = Watcher::new(root, rules);

    info!("Press Ctrl+C to stop");
    watcher.run(&orchestrator).await?;
    Ok(())
}
