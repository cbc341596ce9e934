//! Run log inspection — `foreman status` and `foreman audit`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};

use crate::AuditCommands;
use foreman::audit::{AuditEntry, AuditLog};
use foreman::config::ForemanConfig;
use foreman::orchestrator::StepStatus;

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let latest = latest_run(project_dir)?;
    let snapshot = AuditLog::last_snapshot(&latest)?
        .with_context(|| format!("No snapshot found in {}", latest.display()))?;

    println!(
        "Run {} - {:?} (batch {}/{})",
        snapshot.run_id,
        snapshot.state,
        snapshot.batch_index + 1,
        snapshot.total_batches,
    );
    println!(
        "  {} succeeded, {} failed, {} skipped, {} pending",
        snapshot.count(StepStatus::is_success),
        snapshot.count(|s| matches!(s, StepStatus::Failed { .. })),
        snapshot.count(|s| matches!(s, StepStatus::Skipped)),
        snapshot.count(|s| matches!(s, StepStatus::Pending | StepStatus::Ready)),
    );

    for (id, status) in &snapshot.steps {
        let label = match status {
            StepStatus::Succeeded => style("succeeded").green(),
            StepStatus::Failed { .. } => style("failed").red(),
            StepStatus::Skipped => style("skipped").yellow(),
            StepStatus::Running | StepStatus::Verifying => style("running").cyan(),
            StepStatus::Pending | StepStatus::Ready => style("pending").dim(),
        };
        println!("  {} {}", label, id);
    }

    Ok(())
}

pub fn cmd_audit(project_dir: &Path, command: &AuditCommands) -> Result<()> {
    match command {
        AuditCommands::List => {
            let runs = run_logs(project_dir)?;
            if runs.is_empty() {
                println!("No runs recorded");
                return Ok(());
            }
            for run in runs {
                println!("{}", run.display());
            }
            Ok(())
        }
        AuditCommands::Show { file } => {
            let path = match file {
                Some(path) => path.clone(),
                None => latest_run(project_dir)?,
            };
            show_run(&path)
        }
    }
}

fn show_run(path: &Path) -> Result<()> {
    let entries = AuditLog::load(path)?;

    for entry in entries {
        match entry {
            AuditEntry::Attempt(record) => {
                let outcome = if record.is_success() {
                    style("succeeded").green()
                } else {
                    style("failed").red()
                };
                let duration = record
                    .ended_at
                    .signed_duration_since(record.started_at)
                    .num_milliseconds() as f64
                    / 1000.0;
                println!(
                    "{} attempt {} ({:?}) {} in {:.1}s - {}",
                    record.step_id,
                    record.attempt,
                    record.kind,
                    outcome,
                    duration,
                    truncate(&record.detail, 120),
                );
            }
            AuditEntry::Snapshot(snapshot) => {
                println!(
                    "{} {:?} at batch {}/{}",
                    style("snapshot").dim(),
                    snapshot.state,
                    snapshot.batch_index + 1,
                    snapshot.total_batches,
                );
            }
        }
    }

    Ok(())
}

fn run_logs(project_dir: &Path) -> Result<Vec<PathBuf>> {
    let config = ForemanConfig::load(project_dir)?;
    AuditLog::list_runs(&config.resolved_audit_dir(project_dir))
}

fn latest_run(project_dir: &Path) -> Result<PathBuf> {
    let runs = run_logs(project_dir)?;
    match runs.into_iter().next() {
        Some(path) => Ok(path),
        None => bail!("No runs recorded yet. Run 'foreman run' first."),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut)
}
