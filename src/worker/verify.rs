//! Verification command runner.
//!
//! Runs a step's verification command through the configured shell with a
//! timeout and compares the exit status against the step's success predicate.

use crate::errors::StepError;
use crate::plan::VerifySpec;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for verification commands (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Maximum characters of combined output kept for the audit record.
const OUTPUT_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct VerifyRunner {
    shell: String,
    timeout: Duration,
    working_dir: Option<std::path::PathBuf>,
}

impl Default for VerifyRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            working_dir: None,
        }
    }
}

impl VerifyRunner {
    pub fn new(shell: &str, timeout: Duration) -> Self {
        Self {
            shell: shell.to_string(),
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: std::path::PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Run the verification command. Returns the captured output summary on
    /// success. A timeout kills the command and fails the attempt with
    /// reason `timeout`.
    pub async fn run(&self, spec: &VerifySpec) -> Result<String, StepError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&spec.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, async {
            cmd.spawn()
                .map_err(|source| StepError::VerifySpawn { source })?
                .wait_with_output()
                .await
                .map_err(|source| StepError::VerifySpawn { source })
        })
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(StepError::VerifyTimeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        // A killed process reports no code; treat it as a conventional -1.
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != spec.expect_exit {
            return Err(StepError::Verify {
                exit_code,
                expected: spec.expect_exit,
            });
        }

        Ok(output_tail(&output.stdout, &output.stderr))
    }
}

/// Combine stdout and stderr, keeping only the tail. Failures late in a long
/// verification run are what the audit record needs to show.
fn output_tail(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&err);
    }

    let combined = combined.trim().to_string();
    if combined.chars().count() <= OUTPUT_TAIL_CHARS {
        return combined;
    }
    let tail: String = combined
        .chars()
        .skip(combined.chars().count() - OUTPUT_TAIL_CHARS)
        .collect();
    format!("...{}", tail)
}
