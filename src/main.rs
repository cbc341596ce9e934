use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(version, about = "Plan execution orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to the plan file. Defaults to plan.json in the project directory.
    #[arg(long, global = true)]
    pub plan: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the plan batch by batch
    Run {
        /// Override the configured concurrency cap
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Override the configured retry count
        #[arg(long)]
        max_retries: Option<u32>,

        /// Override the configured verification timeout, in seconds
        #[arg(long)]
        verify_timeout: Option<u64>,
    },
    /// Load and validate the plan, printing the computed batches
    Validate,
    /// Show the latest snapshot of the most recent run
    Status,
    /// Inspect run logs
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List run logs, most recent first
    List,
    /// Print every entry of a run log
    Show {
        /// Run log file; defaults to the most recent
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if cli.verbose { "foreman=debug" } else { "foreman=warn" })
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            max_parallel,
            max_retries,
            verify_timeout,
        } => {
            let code = cmd::cmd_run(
                &cli,
                &project_dir,
                *max_parallel,
                *max_retries,
                *verify_timeout,
            )
            .await?;
            std::process::exit(code);
        }
        Commands::Validate => cmd::cmd_validate(&cli, &project_dir)?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Audit { command } => cmd::cmd_audit(&project_dir, command)?,
    }

    Ok(())
}
