//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled       |
//! |------------|------------------------|
//! | `run`      | `Run`                  |
//! | `validate` | `Validate`             |
//! | `status`   | `Status`, `Audit`      |

pub mod run;
pub mod status;
pub mod validate;

pub use run::cmd_run;
pub use status::{cmd_audit, cmd_status};
pub use validate::cmd_validate;

use crate::Cli;
use foreman::config::DEFAULT_PLAN_FILE;
use std::path::{Path, PathBuf};

/// Resolve the plan file path from the CLI flag or the default location.
pub(crate) fn plan_path(cli: &Cli, project_dir: &Path) -> PathBuf {
    cli.plan
        .clone()
        .unwrap_or_else(|| project_dir.join(DEFAULT_PLAN_FILE))
}
