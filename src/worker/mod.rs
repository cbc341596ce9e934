//! Step execution workers for the foreman orchestrator.
//!
//! A `Worker` executes a single step: apply the change, then run the
//! verification command. Two implementations exist:
//!
//! - `LocalWorker` - applies the step's own shell command in-process
//! - `SubagentWorker` - hands the step to an external agent subprocess
//!
//! The controller is agnostic to which is used. Workers report progress and
//! completion over an event channel and never touch run state directly.

use crate::audit::AttemptRecord;
use crate::errors::StepError;
use crate::plan::Step;
use async_trait::async_trait;
use tokio::sync::mpsc;

mod local;
mod pool;
mod subagent;
mod verify;

pub use local::{ChangeApplier, CommandApplier, LocalWorker};
pub use pool::WorkerPool;
pub use subagent::{CommandRepairer, SubagentConfig, SubagentWorker};
pub use verify::VerifyRunner;

/// Outcome of one step attempt: apply and verify both succeeded, or the
/// attempt failed with a reason.
#[derive(Debug)]
pub enum StepOutcome {
    Succeeded {
        /// Captured verification output summary.
        detail: String,
    },
    Failed {
        error: StepError,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Summary string recorded in the audit log.
    pub fn detail(&self) -> String {
        match self {
            Self::Succeeded { detail } => detail.clone(),
            Self::Failed { error } => error.to_string(),
        }
    }
}

/// Events workers emit while executing a step. Consumed only by the
/// controller, which is the single writer of the status table.
#[derive(Debug)]
pub enum StepEvent {
    /// Worker slot acquired, apply phase starting.
    Started { step_id: String, attempt: u32 },
    /// Apply done, verification command running.
    Verifying { step_id: String, attempt: u32 },
    /// Attempt finished; the record is ready for the audit log.
    Finished { record: AttemptRecord },
}

/// Progress handle given to a worker for the duration of one attempt.
#[derive(Clone)]
pub struct ProgressReporter {
    step_id: String,
    attempt: u32,
    tx: mpsc::Sender<StepEvent>,
}

impl ProgressReporter {
    pub fn new(step_id: &str, attempt: u32, tx: mpsc::Sender<StepEvent>) -> Self {
        Self {
            step_id: step_id.to_string(),
            attempt,
            tx,
        }
    }

    /// Report that the apply phase is done and verification has begun.
    pub async fn verifying(&self) {
        self.tx
            .send(StepEvent::Verifying {
                step_id: self.step_id.clone(),
                attempt: self.attempt,
            })
            .await
            .ok();
    }
}

/// Executes a single step: apply the described change, then verify.
///
/// An attempt succeeds only if both phases succeed. Implementations return
/// failures as outcomes; they do not panic across the task boundary.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, step: &Step, progress: &ProgressReporter) -> StepOutcome;
}

/// Debug/repair collaborator, invoked once per step after ordinary retries
/// are exhausted. A successful repair earns the step one final attempt.
#[async_trait]
pub trait Repairer: Send + Sync {
    async fn repair(&self, step: &Step, history: &[AttemptRecord]) -> Result<(), StepError>;
}
