//! Audit record types for the foreman orchestrator.
//!
//! Every step attempt and every run-state snapshot becomes one entry in the
//! run's append-only log. Entries are immutable once written; a retried step
//! produces a new `AttemptRecord` rather than overwriting the old one.

use crate::orchestrator::RunSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which strategy produced an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Ordinary apply/verify attempt, including retries.
    #[default]
    Standard,
    /// Final attempt after a debug-escalation repair action.
    Repair,
}

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One record per (step, attempt-number). Append-only; owned by the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub step_id: String,
    /// 1-based attempt number across retries and escalation.
    pub attempt: u32,
    #[serde(default)]
    pub kind: AttemptKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Captured output or error summary for post-hoc inspection.
    pub detail: String,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

/// One line of the run log: an attempt or a run-state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEntry {
    Attempt(AttemptRecord),
    Snapshot(RunSnapshot),
}

pub mod log;
pub use log::AuditLog;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            step_id: "01".to_string(),
            attempt: 1,
            kind: AttemptKind::Standard,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            outcome,
            detail: String::new(),
        }
    }

    #[test]
    fn test_attempt_record_success() {
        assert!(record(AttemptOutcome::Succeeded).is_success());
        assert!(!record(AttemptOutcome::Failed).is_success());
    }

    #[test]
    fn test_entry_serialization_is_tagged() {
        let entry = AuditEntry::Attempt(record(AttemptOutcome::Succeeded));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""type":"attempt""#));
        assert!(json.contains(r#""outcome":"succeeded""#));
    }

    #[test]
    fn test_attempt_kind_defaults_to_standard() {
        let json = r#"{"step_id":"01","attempt":1,"started_at":"2026-01-01T00:00:00Z","ended_at":"2026-01-01T00:00:01Z","outcome":"failed","detail":"x"}"#;
        let rec: AttemptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.kind, AttemptKind::Standard);
    }
}
