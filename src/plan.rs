//! Plan and step definitions with JSON loading for the foreman orchestrator.
//!
//! This module provides:
//! - `Step` struct representing a single unit of planned work
//! - `Plan` struct representing the full plan file format
//! - Loading and field validation for JSON-based plans
//!
//! A plan is immutable once loaded. Step status lives in the execution
//! controller's state table, not on the step itself, so only the controller
//! ever holds a mutable handle to execution state.

use crate::errors::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Execution mode for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run one step at a time in dependency order.
    Sequential,
    /// Run independent steps concurrently, up to the configured limit.
    #[default]
    Parallel,
}

/// Verification criteria for a step: an opaque command plus the exit code
/// that counts as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySpec {
    /// Command run through the configured shell.
    pub command: String,
    /// Exit code treated as success.
    #[serde(default)]
    pub expect_exit: i32,
}

impl VerifySpec {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            expect_exit: 0,
        }
    }
}

/// Represents a single unit of planned work with a verification gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Step id, unique within the plan (e.g. "01", "db-schema").
    pub id: String,
    /// Human-readable description of the change to make.
    pub description: String,
    /// Target file paths this step is expected to touch.
    pub files: Vec<PathBuf>,
    /// Apply command run through the shell. Optional: when a subagent worker
    /// is configured it performs the change from the description instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<String>,
    /// Verification command and success predicate.
    pub verify: VerifySpec,
    /// Ids of steps that must succeed before this step starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Step {
    /// Create a new step. Test and example construction helper.
    pub fn new(id: &str, description: &str, verify: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            files: Vec::new(),
            apply: None,
            verify: VerifySpec::new(verify),
            depends_on,
        }
    }

    /// Set the target files.
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    /// Set the apply command.
    pub fn with_apply(mut self, apply: &str) -> Self {
        self.apply = Some(apply.to_string());
        self
    }
}

/// Represents the full plan file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// Execution mode for the whole plan.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Ordered list of steps.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create a plan from steps. Validates ids and dependency references.
    pub fn new(mode: ExecutionMode, steps: Vec<Step>) -> Result<Self, PlanError> {
        let plan = Self { mode, steps };
        plan.validate_fields()?;
        Ok(plan)
    }

    /// Load a plan from a JSON file and validate its fields.
    ///
    /// Fails with `PlanError::Parse` on missing or unknown fields, and with
    /// the specific variant for duplicate ids or unknown dependency ids.
    /// Cycle detection is a separate pass (`validate_acyclic`).
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let plan: Plan = serde_json::from_str(&content).map_err(|source| PlanError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        plan.validate_fields()?;
        Ok(plan)
    }

    /// Save the plan to a JSON file. Used by tests and plan tooling.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate that the dependency graph is acyclic.
    ///
    /// Delegates to the DAG builder's Kahn check; the error names the steps
    /// involved in the cycle.
    pub fn validate_acyclic(&self) -> Result<(), PlanError> {
        crate::dag::StepGraph::build(&self.steps).map(|_| ())
    }

    /// Get all steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get a specific step by id.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Number of steps in the plan.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn validate_fields(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStep {
                    id: step.id.clone(),
                });
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
