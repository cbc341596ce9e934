//! Dependency batching for parallel step execution.
//!
//! This module turns a plan's dependency edges into an ordered sequence of
//! batches. Steps within one batch have no dependency relationship to each
//! other and are safe to run concurrently; batches execute strictly in order.
//!
//! Two components:
//!
//! 1. **StepGraph** - validated dependency graph with cycle detection
//! 2. **Batcher** - Kahn-style topological layering into batches, with an
//!    optional split of batches whose steps declare overlapping target files
//!
//! ## Example
//!
//! ```no_run
//! use foreman::plan::{ExecutionMode, Plan, Step};
//! use foreman::dag::{compute_batches, BatchOptions};
//!
//! # fn example() -> Result<(), foreman::errors::PlanError> {
//! let plan = Plan::new(ExecutionMode::Parallel, vec![
//!     Step::new("01", "Setup", "true", vec![]),
//!     Step::new("02", "Core", "true", vec!["01".to_string()]),
//!     Step::new("03", "Tests", "true", vec!["01".to_string()]),
//! ])?;
//!
//! let batches = compute_batches(&plan, &BatchOptions::default())?;
//! // Batch 0: [01]
//! // Batch 1: [02, 03] - independent, run concurrently
//! # Ok(())
//! # }
//! ```

mod batcher;
mod builder;

pub use batcher::{Batch, BatchOptions, compute_batches};
pub use builder::{StepGraph, StepIndex};
