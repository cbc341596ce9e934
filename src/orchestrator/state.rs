//! Execution state for the run controller.
//!
//! Step status is owned exclusively by the controller: workers report
//! outcomes over a channel and never mutate state directly. External
//! observers see immutable `RunSnapshot` values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Plan loaded and batches computed, no step started.
    #[default]
    Idle,
    /// Iterating batches.
    Running,
    /// All batches completed, every step succeeded.
    Succeeded,
    /// A step failed permanently.
    Failed,
    /// Cancellation was requested and the in-flight batch drained.
    Aborted,
}

impl RunState {
    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    /// Process exit code for this terminal state. Distinguishes "a step
    /// failed" from "the run was cancelled".
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Aborted => 130,
            Self::Idle | Self::Running => 0,
        }
    }
}

/// Status of a single step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepStatus {
    /// Waiting for its batch to be dispatched.
    #[default]
    Pending,
    /// Batch dispatched, waiting for a worker slot.
    Ready,
    /// Apply phase in progress.
    Running,
    /// Apply done, verification command in progress.
    Verifying,
    /// Apply and verification both succeeded.
    Succeeded,
    /// Retries and escalation exhausted.
    Failed { reason: String },
    /// Never started because an earlier step failed.
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Skipped)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Verifying)
    }
}

/// Immutable view of run state, published on every change and persisted at
/// batch boundaries and terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub state: RunState,
    /// Index of the batch currently in flight (or about to be).
    pub batch_index: usize,
    pub total_batches: usize,
    pub steps: BTreeMap<String, StepStatus>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.steps.values().filter(|s| pred(s)).count()
    }
}

/// A permanently failed step and its last recorded reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedStep {
    pub id: String,
    pub reason: String,
}

/// Final report for a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_steps: Vec<FailedStep>,
    /// Batch that was in flight when cancellation was requested.
    pub aborted_in_batch: Option<usize>,
    pub duration: Duration,
    pub audit_path: PathBuf,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.state == RunState::Succeeded
    }
}
