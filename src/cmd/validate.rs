//! Plan inspection without execution — `foreman validate`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::Cli;
use foreman::config::ForemanConfig;
use foreman::dag::{BatchOptions, compute_batches};
use foreman::plan::Plan;

pub fn cmd_validate(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = ForemanConfig::load(project_dir)?;
    let plan_path = super::plan_path(cli, project_dir);

    let plan = Plan::load(&plan_path)
        .with_context(|| format!("Failed to load plan from {}", plan_path.display()))?;

    let options = BatchOptions {
        split_file_overlaps: config.split_file_overlaps,
    };
    let batches = compute_batches(&plan, &options)?;

    println!(
        "{} {} steps, {:?} mode, {} batches",
        style("Valid:").green().bold(),
        plan.len(),
        plan.mode,
        batches.len(),
    );

    for (i, batch) in batches.iter().enumerate() {
        println!("  Batch {}: {}", i, batch.step_ids.join(", "));
    }

    Ok(())
}
