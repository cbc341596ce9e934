//! Subprocess worker: delegates the apply phase to an external agent.
//!
//! The subagent receives the step as JSON on stdin and signals apply success
//! with a zero exit. Verification still runs locally so the gate cannot be
//! bypassed by an over-eager agent. The same stdin protocol drives the
//! repair collaborator used for debug escalation.

use crate::audit::AttemptRecord;
use crate::errors::StepError;
use crate::plan::Step;
use crate::worker::verify::VerifyRunner;
use crate::worker::{ProgressReporter, Repairer, StepOutcome, Worker};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for a subagent apply (30 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Configuration for spawning subagent processes.
#[derive(Debug, Clone)]
pub struct SubagentConfig {
    /// Command to spawn, e.g. an agent CLI.
    pub command: String,
    /// Arguments passed before the step payload.
    pub args: Vec<String>,
    /// Working directory for the subagent.
    pub working_dir: Option<PathBuf>,
    /// Timeout for one apply invocation.
    pub timeout: Duration,
}

impl SubagentConfig {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Spawn the configured command, write `payload` as JSON to its stdin, and
/// wait for exit within the timeout.
async fn invoke<T: Serialize>(
    config: &SubagentConfig,
    payload: &T,
    what: &str,
) -> Result<(), StepError> {
    let json = serde_json::to_vec(payload).map_err(|e| StepError::Apply {
        message: format!("failed to encode {} payload: {}", what, e),
    })?;

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let run = async {
        let mut child = cmd
            .spawn()
            .map_err(|source| StepError::ApplySpawn { source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&json)
                .await
                .map_err(|source| StepError::ApplySpawn { source })?;
            stdin
                .shutdown()
                .await
                .map_err(|source| StepError::ApplySpawn { source })?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|source| StepError::ApplySpawn { source })
    };

    let output = match tokio::time::timeout(config.timeout, run).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(StepError::Apply {
                message: format!(
                    "{} subagent timed out after {}s",
                    what,
                    config.timeout.as_secs()
                ),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StepError::Apply {
            message: format!(
                "{} subagent exited with {}: {}",
                what,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    Ok(())
}

/// Worker that delegates the apply phase to a subagent subprocess.
pub struct SubagentWorker {
    config: SubagentConfig,
    verifier: VerifyRunner,
}

impl SubagentWorker {
    pub fn new(config: SubagentConfig, verifier: VerifyRunner) -> Self {
        Self { config, verifier }
    }
}

#[async_trait]
impl Worker for SubagentWorker {
    async fn execute(&self, step: &Step, progress: &ProgressReporter) -> StepOutcome {
        if let Err(error) = invoke(&self.config, step, "apply").await {
            return StepOutcome::Failed { error };
        }

        progress.verifying().await;

        match self.verifier.run(&step.verify).await {
            Ok(detail) => StepOutcome::Succeeded { detail },
            Err(error) => StepOutcome::Failed { error },
        }
    }
}

/// Payload handed to the repair collaborator: the failed step and its
/// attempt history so far.
#[derive(Debug, Serialize)]
struct RepairRequest<'a> {
    step: &'a Step,
    attempts: &'a [AttemptRecord],
}

/// Production repairer: a configured command receiving the repair request on
/// stdin. Zero exit means the repair action was applied.
pub struct CommandRepairer {
    config: SubagentConfig,
}

impl CommandRepairer {
    pub fn new(config: SubagentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Repairer for CommandRepairer {
    async fn repair(&self, step: &Step, history: &[AttemptRecord]) -> Result<(), StepError> {
        let request = RepairRequest {
            step,
            attempts: history,
        };
        invoke(&self.config, &request, "repair")
            .await
            .map_err(|e| StepError::Repair {
                message: e.to_string(),
            })
    }
}
