//! Plan execution — `foreman run`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;
use std::sync::Arc;

use crate::Cli;
use foreman::config::{ForemanConfig, WorkerBackend};
use foreman::orchestrator::{Orchestrator, RunReport, RunState};
use foreman::plan::Plan;
use foreman::worker::{
    CommandApplier, CommandRepairer, LocalWorker, Repairer, SubagentConfig, SubagentWorker,
    VerifyRunner, Worker,
};

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    max_parallel: Option<usize>,
    max_retries: Option<u32>,
    verify_timeout: Option<u64>,
) -> Result<i32> {
    let mut config = ForemanConfig::load(project_dir)?;
    if let Some(value) = max_parallel {
        config.max_parallel = value;
    }
    if let Some(value) = max_retries {
        config.max_retries = value;
    }
    if let Some(value) = verify_timeout {
        config.verify_timeout_secs = value;
    }

    let plan_path = super::plan_path(cli, project_dir);
    let plan = Plan::load(&plan_path)
        .with_context(|| format!("Failed to load plan from {}", plan_path.display()))?;
    plan.validate_acyclic()?;

    println!(
        "{} {} steps from {} ({:?} mode)",
        style("Loaded").green().bold(),
        plan.len(),
        plan_path.display(),
        plan.mode,
    );

    let orchestrator = build_orchestrator(&config, project_dir)?;
    let mut handle = orchestrator.start_run(plan)?;

    println!(
        "{} run {} (audit: {})",
        style("Started").green().bold(),
        handle.run_id(),
        handle.audit_path().display(),
    );

    let mut finished = None;
    tokio::select! {
        report = handle.wait() => finished = Some(report?),
        _ = tokio::signal::ctrl_c() => {}
    }

    let report = match finished {
        Some(report) => report,
        None => {
            eprintln!(
                "{} finishing in-flight steps...",
                style("Cancelling:").yellow().bold()
            );
            handle.cancel();
            handle.wait().await?
        }
    };

    print_report(&report);
    Ok(report.state.exit_code())
}

/// Build a subagent config from a command line string, splitting program and
/// arguments on whitespace.
fn subagent_config(command: &str, config: &ForemanConfig, project_dir: &Path) -> Result<SubagentConfig> {
    let mut parts = command.split_whitespace().map(String::from);
    let Some(program) = parts.next() else {
        bail!("Empty subagent command");
    };
    Ok(SubagentConfig::new(&program)
        .with_args(parts.collect())
        .with_working_dir(project_dir.to_path_buf())
        .with_timeout(config.subagent_timeout()))
}

fn build_orchestrator(config: &ForemanConfig, project_dir: &Path) -> Result<Orchestrator> {
    let verifier = VerifyRunner::new(&config.shell, config.verify_timeout())
        .with_working_dir(project_dir.to_path_buf());

    let worker: Arc<dyn Worker> = match config.worker {
        WorkerBackend::Local => {
            let applier =
                CommandApplier::new(&config.shell).with_working_dir(project_dir.to_path_buf());
            Arc::new(LocalWorker::new(Arc::new(applier), verifier))
        }
        WorkerBackend::Subagent => {
            let Some(cmd) = &config.subagent_cmd else {
                bail!("worker = \"subagent\" requires subagent_cmd in foreman.toml");
            };
            Arc::new(SubagentWorker::new(
                subagent_config(cmd, config, project_dir)?,
                verifier,
            ))
        }
    };

    let options = foreman::orchestrator::RunOptions {
        max_parallel: config.max_parallel,
        max_retries: config.max_retries,
        batch: foreman::dag::BatchOptions {
            split_file_overlaps: config.split_file_overlaps,
        },
        audit_dir: config.resolved_audit_dir(project_dir),
    };

    let mut orchestrator = Orchestrator::new(worker, options);

    if let Some(repair_cmd) = &config.repair_cmd {
        let repairer: Arc<dyn Repairer> = Arc::new(CommandRepairer::new(subagent_config(
            repair_cmd,
            config,
            project_dir,
        )?));
        orchestrator = orchestrator.with_repairer(repairer);
    }

    Ok(orchestrator)
}

fn print_report(report: &RunReport) {
    println!();
    match report.state {
        RunState::Succeeded => {
            println!(
                "{} {} steps in {:.1}s",
                style("Succeeded:").green().bold(),
                report.succeeded,
                report.duration.as_secs_f64(),
            );
        }
        RunState::Failed => {
            println!(
                "{} {} succeeded, {} failed, {} skipped",
                style("Failed:").red().bold(),
                report.succeeded,
                report.failed,
                report.skipped,
            );
            for failed in &report.failed_steps {
                println!("  {} {}: {}", style("✗").red(), failed.id, failed.reason);
            }
        }
        RunState::Aborted => {
            let batch = report
                .aborted_in_batch
                .map(|i| format!("batch {}", i))
                .unwrap_or_else(|| "no batch".to_string());
            println!(
                "{} cancelled with {} in flight ({} succeeded, {} failed)",
                style("Aborted:").yellow().bold(),
                batch,
                report.succeeded,
                report.failed,
            );
        }
        RunState::Idle | RunState::Running => {}
    }
    println!("Audit log: {}", report.audit_path.display());
}
