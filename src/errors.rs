//! Typed error hierarchy for the foreman orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `PlanError` — plan loading and dependency-graph validation failures
//! - `StepError` — per-step apply/verify/repair failures (retryable)
//! - `RunError` — run-level failures from the execution controller

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a plan.
///
/// All variants are load-time fatal: nothing executes when one is returned.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to read plan file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed plan at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Plan contains no steps")]
    Empty,

    #[error("Duplicate step id: {id}")]
    DuplicateStep { id: String },

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Dependency cycle detected. Involved steps: {steps:?}")]
    Cycle { steps: Vec<String> },
}

/// Errors from a single step attempt. Handled by the retry policy; they only
/// escalate to a run-level failure once retries and escalation are exhausted.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Apply failed: {message}")]
    Apply { message: String },

    #[error("Failed to spawn apply command: {source}")]
    ApplySpawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Verification exited with code {exit_code}, expected {expected}")]
    Verify { exit_code: i32, expected: i32 },

    #[error("Verification timed out after {timeout_secs}s")]
    VerifyTimeout { timeout_secs: u64 },

    #[error("Failed to spawn verification command: {source}")]
    VerifySpawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Repair action failed: {message}")]
    Repair { message: String },
}

impl StepError {
    /// Short reason tag recorded in the audit log.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Apply { .. } | Self::ApplySpawn { .. } => "apply",
            Self::Verify { .. } | Self::VerifySpawn { .. } => "verify",
            Self::VerifyTimeout { .. } => "timeout",
            Self::Repair { .. } => "repair",
        }
    }
}

/// Errors from the execution controller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Worker pool concurrency limit must be at least 1")]
    PoolExhausted,

    #[error("Run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
