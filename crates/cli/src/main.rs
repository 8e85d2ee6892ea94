//! taskstack CLI - run a layered plan through the quality-gated pipeline.

mod builtin;
mod plan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use taskstack_core::{ExecutionStatus, Task, TaskStatus};
use taskstack_pipeline::{DescriptorRegistry, Pipeline, PipelineConfig};
use taskstack_scheduler::{ScheduleUnit, SchedulerError, TaskStack, TaskUpdate};
use taskstack_workspace::{InMemoryWorkspace, JsonWorkspace, Workspace};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::builtin::{registrations, rubric_dimensions, OfflineModel};
use crate::plan::{Plan, PlanTask};

#[derive(Parser)]
#[command(name = "taskstack")]
#[command(about = "Layered task stack with a quality-gated execution pipeline", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan file
    Run {
        /// Plan JSON file
        plan: PathBuf,
        /// Pipeline configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override max attempts per dispatch
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Directory for artifacts and logs; kept in memory when absent
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// List registered executors
    Executors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let registry = Arc::new(DescriptorRegistry::new(registrations()));

    match cli.command {
        Commands::Run {
            plan,
            config,
            max_attempts,
            workspace,
        } => {
            let plan = Plan::load(&plan).await?;
            plan.validate(&registry.list())?;

            let mut config = load_config(config.as_deref()).await?;
            if let Some(attempts) = max_attempts {
                config = config.with_max_attempts(attempts);
            }

            let workspace: Arc<dyn Workspace> = match workspace {
                Some(dir) => Arc::new(JsonWorkspace::new(&dir).await.with_context(|| {
                    format!("Failed to open workspace {}", dir.display())
                })?),
                None => Arc::new(InMemoryWorkspace::new()),
            };
            let pipeline = Pipeline::new(
                Arc::clone(&registry),
                Arc::new(OfflineModel::new(rubric_dimensions())),
                workspace,
            )
            .with_config(config);

            let stack = TaskStack::new();
            let report = stack.apply_batch(plan.to_batch()?);
            if !report.success {
                bail!("Failed to build stack: {}", report.errors.join("; "));
            }
            info!(
                tasks = report.created_task_ids.len(),
                layers = report.created_layer_indices.len(),
                "Built stack"
            );

            drive(&stack, &pipeline).await?;
            print_summary(&stack.list_tasks());
        }
        Commands::Executors => {
            let infos = registry.describe();
            println!("Executors ({})", infos.len());
            for info in infos {
                let upstream = if info.upstream_keys.is_empty() {
                    "-".to_string()
                } else {
                    info.upstream_keys.join(",")
                };
                println!(
                    "  {} | asset {} | upstream {} | {}{}",
                    info.executor_id,
                    info.asset_key,
                    upstream,
                    info.description,
                    if info.materializes { " [artifacts]" } else { "" }
                );
            }
        }
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

/// Claim units until the stack is exhausted.
async fn drive(stack: &TaskStack, pipeline: &Pipeline) -> Result<()> {
    loop {
        let unit = match stack.claim() {
            Ok(unit) => unit,
            Err(SchedulerError::Exhausted) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match unit {
            ScheduleUnit::PreHook { layer, hook } => {
                info!(layer = layer.index, hook = %hook.descriptor(), "Pre-hook due");
            }
            ScheduleUnit::PostHook { layer, hook } => {
                info!(layer = layer.index, hook = %hook.descriptor(), "Post-hook due");
            }
            ScheduleUnit::Task { layer, task, .. } => {
                info!(layer = layer.index, task_id = %task.id, "Running task");
                run_task(stack, pipeline, task).await?;
            }
        }
    }
}

/// Dispatch a task through its executor chain and record the outcome.
async fn run_task(stack: &TaskStack, pipeline: &Pipeline, task: Task) -> Result<()> {
    let plan_task: PlanTask = serde_json::from_value(task.description.clone())
        .with_context(|| format!("Task {} has no plan entry", task.id))?;
    stack.update_task(task.id, TaskUpdate::status(TaskStatus::InProgress))?;

    let extra_inputs = plan_task.extra_inputs();
    let mut outcome: Option<Value> = None;
    let mut failure: Option<Value> = None;

    for executor_id in plan_task.chain() {
        let priors = pipeline.prior_assets(task.id);
        let record = pipeline
            .dispatch(executor_id, task.id, &priors, &extra_inputs)
            .await?;

        stack.update_task(
            task.id,
            TaskUpdate::default().with_progress(
                executor_id,
                json!({"status": record.status, "attempts": record.attempts}),
            ),
        )?;

        if record.status == ExecutionStatus::Completed {
            outcome = record.output;
        } else {
            error!(task_id = %task.id, executor_id, "Executor chain stopped");
            failure = Some(json!({"executor_id": executor_id, "error": record.error}));
            break;
        }
    }

    let update = match (failure, outcome) {
        (Some(failure), _) => TaskUpdate::status(TaskStatus::Failed).with_results(failure),
        (None, Some(output)) => TaskUpdate::status(TaskStatus::Completed).with_results(output),
        (None, None) => {
            warn!(task_id = %task.id, "Task produced no output");
            TaskUpdate::status(TaskStatus::Failed)
        }
    };
    stack.update_task(task.id, update)?;
    Ok(())
}

fn print_summary(tasks: &[Task]) {
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    println!("Tasks ({}, {} completed)", tasks.len(), completed);
    for task in tasks {
        let title = task.description["description"].as_str().unwrap_or("-");
        let attempts: u64 = task
            .progress
            .values()
            .filter_map(|p| p["attempts"].as_u64())
            .sum();
        println!("  {} | {} | {} attempt(s) | {}", task.id, task.status, attempts, title);
    }
}
