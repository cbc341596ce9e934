//! Execution controller for foreman runs.
//!
//! The controller drives batch-by-batch progress: it dispatches each batch to
//! the worker pool, awaits the full fan-in, applies the retry and debug
//! escalation policy on failure, and decides the terminal state. It is the
//! only writer of step status; worker outcomes arrive over a single event
//! channel.
//!
//! ## Example
//!
//! ```no_run
//! use foreman::orchestrator::{Orchestrator, RunOptions};
//! use foreman::plan::Plan;
//! use foreman::worker::{CommandApplier, LocalWorker, VerifyRunner};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let plan = Plan::load(Path::new("plan.json"))?;
//! let worker = LocalWorker::new(Arc::new(CommandApplier::new("sh")), VerifyRunner::default());
//!
//! let orchestrator = Orchestrator::new(Arc::new(worker), RunOptions::default());
//! let mut handle = orchestrator.start_run(plan)?;
//!
//! let report = handle.wait().await?;
//! println!("run finished: {:?}", report.state);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod state;

pub use controller::{Orchestrator, RunHandle, RunOptions};
pub use state::{FailedStep, RunReport, RunSnapshot, RunState, StepStatus};
