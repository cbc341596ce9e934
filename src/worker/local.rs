//! In-process worker: shell-command apply plus local verification.

use crate::errors::StepError;
use crate::plan::Step;
use crate::worker::verify::VerifyRunner;
use crate::worker::{ProgressReporter, StepOutcome, Worker};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Performs a step's described change. The orchestrator treats this as an
/// opaque blocking call; file edits are assumed confined to the step's
/// declared paths.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(&self, step: &Step) -> Result<(), StepError>;
}

/// Production applier: runs the step's `apply` command through the shell.
/// A step without an apply command is verify-only and applies trivially.
pub struct CommandApplier {
    shell: String,
    working_dir: Option<PathBuf>,
}

impl CommandApplier {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

#[async_trait]
impl ChangeApplier for CommandApplier {
    async fn apply(&self, step: &Step) -> Result<(), StepError> {
        let Some(apply) = &step.apply else {
            return Ok(());
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(apply)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .spawn()
            .map_err(|source| StepError::ApplySpawn { source })?
            .wait_with_output()
            .await
            .map_err(|source| StepError::ApplySpawn { source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StepError::Apply {
                message: format!(
                    "command exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        Ok(())
    }
}

/// Worker that applies and verifies within this process.
pub struct LocalWorker {
    applier: Arc<dyn ChangeApplier>,
    verifier: VerifyRunner,
}

impl LocalWorker {
    pub fn new(applier: Arc<dyn ChangeApplier>, verifier: VerifyRunner) -> Self {
        Self { applier, verifier }
    }
}

#[async_trait]
impl Worker for LocalWorker {
    async fn execute(&self, step: &Step, progress: &ProgressReporter) -> StepOutcome {
        if let Err(error) = self.applier.apply(step).await {
            return StepOutcome::Failed { error };
        }

        progress.verifying().await;

        match self.verifier.run(&step.verify).await {
            Ok(detail) => StepOutcome::Succeeded { detail },
            Err(error) => StepOutcome::Failed { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::StepEvent;
    use tokio::sync::mpsc;

    fn reporter() -> (ProgressReporter, mpsc::Receiver<StepEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (ProgressReporter::new("01", 1, tx), rx)
    }

    #[tokio::test]
    async fn test_verify_only_step_succeeds() {
        let worker = LocalWorker::new(Arc::new(CommandApplier::new("sh")), VerifyRunner::default());
        let step = Step::new("01", "verify only", "true", vec![]);
        let (progress, _rx) = reporter();

        let outcome = worker.execute(&step, &progress).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_apply_failure_short_circuits_verify() {
        let worker = LocalWorker::new(Arc::new(CommandApplier::new("sh")), VerifyRunner::default());
        let step = Step::new("01", "broken apply", "true", vec![]).with_apply("exit 7");
        let (progress, mut rx) = reporter();

        let outcome = worker.execute(&step, &progress).await;
        match outcome {
            StepOutcome::Failed {
                error: StepError::Apply { message },
            } => assert!(message.contains("7")),
            other => panic!("Expected Apply failure, got {:?}", other),
        }
        // Verifying must never have been reported.
        drop(worker);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_apply_then_failing_verify() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("applied.txt");

        let worker = LocalWorker::new(Arc::new(CommandApplier::new("sh")), VerifyRunner::default());
        let step = Step::new("01", "apply then verify", "false", vec![])
            .with_apply(&format!("touch {}", marker.display()));
        let (progress, mut rx) = reporter();

        let outcome = worker.execute(&step, &progress).await;
        assert!(!outcome.is_success());
        assert!(marker.exists(), "apply phase must have run");
        assert!(matches!(
            rx.try_recv(),
            Ok(StepEvent::Verifying { .. })
        ));
    }

    #[tokio::test]
    async fn test_working_dir_applies() {
        let dir = tempfile::tempdir().unwrap();
        let applier = CommandApplier::new("sh").with_working_dir(dir.path().to_path_buf());
        let step = Step::new("01", "relative touch", "true", vec![]).with_apply("touch here.txt");

        applier.apply(&step).await.unwrap();
        assert!(dir.path().join("here.txt").exists());
    }
}
