//! Configuration for foreman.
//!
//! Settings load from `foreman.toml` in the project directory when present,
//! fall back to defaults otherwise, and are overridden field-by-field by CLI
//! flags (handled in the command layer). Unknown keys are rejected so typos
//! fail loudly instead of silently running with defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the project directory.
pub const CONFIG_FILE: &str = "foreman.toml";

/// Default plan file name.
pub const DEFAULT_PLAN_FILE: &str = "plan.json";

/// Which worker implementation executes steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerBackend {
    /// Apply steps with their own shell commands, in-process.
    #[default]
    Local,
    /// Delegate the apply phase to a subagent subprocess.
    Subagent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForemanConfig {
    /// Concurrency cap for parallel-mode plans.
    pub max_parallel: usize,
    /// Re-attempts of a failed step before debug escalation.
    pub max_retries: u32,
    /// Timeout for verification commands, in seconds.
    pub verify_timeout_secs: u64,
    /// Shell used for apply and verification commands.
    pub shell: String,
    /// Worker backend.
    pub worker: WorkerBackend,
    /// Subagent command; required when `worker = "subagent"`.
    pub subagent_cmd: Option<String>,
    /// Timeout for one subagent apply, in seconds.
    pub subagent_timeout_secs: u64,
    /// Repair command for debug escalation. Escalation is skipped when
    /// absent.
    pub repair_cmd: Option<String>,
    /// Split batches whose steps declare overlapping target files.
    pub split_file_overlaps: bool,
    /// Audit directory, relative to the project directory unless absolute.
    pub audit_dir: PathBuf,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_retries: 1,
            verify_timeout_secs: 300,
            shell: "sh".to_string(),
            worker: WorkerBackend::Local,
            subagent_cmd: None,
            subagent_timeout_secs: 1800,
            repair_cmd: None,
            split_file_overlaps: true,
            audit_dir: PathBuf::from(".foreman/audit"),
        }
    }
}

impl ForemanConfig {
    /// Load from `<project_dir>/foreman.toml`, or defaults when the file
    /// does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Audit directory resolved against the project directory.
    pub fn resolved_audit_dir(&self, project_dir: &Path) -> PathBuf {
        if self.audit_dir.is_absolute() {
            self.audit_dir.clone()
        } else {
            project_dir.join(&self.audit_dir)
        }
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn subagent_timeout(&self) -> Duration {
        Duration::from_secs(self.subagent_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = TempDir::new().unwrap();
        let config = ForemanConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.worker, WorkerBackend::Local);
        assert!(config.split_file_overlaps);
    }

    #[test]
    fn test_load_partial_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "max_parallel = 8\nshell = \"bash\"\n",
        )
        .unwrap();

        let config = ForemanConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_parallel, 8);
        assert_eq!(config.shell, "bash");
        // Unspecified keys keep their defaults.
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "max_paralel = 8\n").unwrap();
        assert!(ForemanConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_worker_backend_parsing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "worker = \"subagent\"\nsubagent_cmd = \"agent-cli\"\n",
        )
        .unwrap();

        let config = ForemanConfig::load(dir.path()).unwrap();
        assert_eq!(config.worker, WorkerBackend::Subagent);
        assert_eq!(config.subagent_cmd.as_deref(), Some("agent-cli"));
    }

    #[test]
    fn test_audit_dir_resolution() {
        let config = ForemanConfig::default();
        let resolved = config.resolved_audit_dir(Path::new("/proj"));
        assert_eq!(resolved, PathBuf::from("/proj/.foreman/audit"));

        let absolute = ForemanConfig {
            audit_dir: PathBuf::from("/var/log/foreman"),
            ..Default::default()
        };
        assert_eq!(
            absolute.resolved_audit_dir(Path::new("/proj")),
            PathBuf::from("/var/log/foreman")
        );
    }
}
