// src/lib.rs

pub mod agent;
pub mod cli;
pub mod config;
pub mod control;
pub mod controller;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod identity;
pub mod logging;
pub mod settings;
pub mod status;
pub mod types;

use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::cli::{CliArgs, Command};
use crate::config::{DagConfig, load_and_validate};
use crate::controller::{Controller, DagController};
use crate::dag::ExecutionGraph;
use crate::settings::Settings;
use crate::types::SchedulerStatus;

/// High-level entry point used by `main.rs`.
///
/// Settings are resolved once from the environment here and passed down.
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = Settings::from_env();
    debug!(?settings, "resolved settings");

    match args.command {
        Command::Start { params, config } => {
            let cfg = load_and_validate(&config, params.as_deref(), &settings)?;
            let status = Agent::new(cfg, settings).run().await?;
            report_final(status.status)
        }
        Command::Retry { run_id, config } => {
            let cfg = load_and_validate(&config, None, &settings)?;
            let status = Agent::new(cfg, settings).retry_of(run_id).run().await?;
            report_final(status.status)
        }
        Command::Status { config } => {
            let controller = controller_for(&config, &settings)?;
            let status = controller.get_status().await?;
            let pid = status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-1".to_string());
            info!("Pid={pid} Status={}", status.status_text);
            Ok(())
        }
        Command::Stop { config } => {
            let controller = controller_for(&config, &settings)?;
            info!("Stopping...");
            if controller.stop().await? {
                info!(dag = %controller.config().name, "stop request sent");
            } else {
                info!(dag = %controller.config().name, "DAG is not running");
            }
            Ok(())
        }
        Command::Dry { config } => {
            let cfg = load_and_validate(&config, None, &settings)?;
            print_dry_run(&cfg)
        }
        Command::List { dir } => print_dag_list(&dir, &settings).await,
    }
}

/// One line per DAG: name, last status, definition file.
async fn print_dag_list(dir: &Path, settings: &Settings) -> Result<()> {
    let (dags, errors) = DagController::list_dags(dir, settings);
    for err in &errors {
        warn!("{err}");
    }

    for cfg in dags {
        let path = cfg.path.clone();
        let controller = DagController::new(cfg, settings);
        let status = match controller.get_last_status().await {
            Ok(status) => status.status_text,
            Err(e) => format!("unknown ({e})"),
        };
        println!("{:<24} {:<12} {}", controller.config().name, status, path.display());
    }

    if !errors.is_empty() {
        bail!("{} DAG file(s) failed to load", errors.len());
    }
    Ok(())
}

fn controller_for(config: &Path, settings: &Settings) -> Result<DagController> {
    let cfg = load_and_validate(config, None, settings)?;
    Ok(DagController::new(cfg, settings))
}

fn report_final(status: SchedulerStatus) -> Result<()> {
    match status {
        SchedulerStatus::Success => Ok(()),
        other => bail!("run finished with status: {other}"),
    }
}

/// Validate the graph and print steps, deps and commands.
fn print_dry_run(cfg: &DagConfig) -> Result<()> {
    let graph = ExecutionGraph::build(cfg.steps.clone())?;

    println!("dagrun dry-run: {}", cfg.name);
    if !cfg.description.is_empty() {
        println!("  {}", cfg.description);
    }
    println!("  params = {:?}", cfg.params);
    println!("  max_active_runs = {}", cfg.max_active_runs);
    println!("  log_dir = {}", cfg.log_dir.display());
    println!();

    println!("steps ({}), in execution order:", graph.len());
    for id in graph.topological_order() {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        let step = node.step();
        println!("  - {}", step.name);
        println!("      cmd: {}", step.command_line());
        if !step.depends.is_empty() {
            println!("      depends: {:?}", step.depends);
        }
        if step.retry_policy.limit > 0 {
            println!("      retry limit: {}", step.retry_policy.limit);
        }
        if step.repeat_policy.enabled {
            println!("      repeat every: {:?}", step.repeat_policy.interval);
        }
        if !step.preconditions.is_empty() {
            println!("      preconditions: {}", step.preconditions.len());
        }
    }

    let handlers = [
        ("on_success", &cfg.handlers.on_success),
        ("on_failure", &cfg.handlers.on_failure),
        ("on_cancel", &cfg.handlers.on_cancel),
        ("on_exit", &cfg.handlers.on_exit),
    ];
    for (kind, step) in handlers {
        if let Some(step) = step {
            println!("  handler {kind}: {}", step.command_line());
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
