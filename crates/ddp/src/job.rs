//! Job status structures.
//!
//! A long-running method answers its call with a bare integer job id.
//! The job itself lives server-side and is observed through
//! `core.get_jobs`, whose entries this module models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// `WAITING → RUNNING → {SUCCESS | FAILED | ABORTED}`; the three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Waiting,
    Running,
    Success,
    Failed,
    Aborted,
}

impl JobState {
    /// Whether no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Progress block of a `core.get_jobs` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct JobProgress {
    /// 0.0–100.0; the server may omit or null it early in the job.
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One `core.get_jobs` entry, reduced to the fields the client acts on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub result: Value,
    /// Failure message; empty or absent unless the job failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Observed completion percentage, defaulting to 0 when the server
    /// has not reported one yet.
    pub fn percent(&self) -> f64 {
        self.progress.percent.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Aborted.is_terminal());
    }

    #[test]
    fn parse_running_entry() {
        let snap: JobSnapshot = serde_json::from_value(json!({
            "id": 42,
            "state": "RUNNING",
            "progress": { "percent": 37.5, "description": "rolling back" },
            "result": null,
            "error": null,
        }))
        .unwrap();
        assert_eq!(snap.id, JobId(42));
        assert_eq!(snap.state, JobState::Running);
        assert!((snap.percent() - 37.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_entry_without_progress() {
        let snap: JobSnapshot = serde_json::from_value(json!({
            "id": 7,
            "state": "WAITING",
        }))
        .unwrap();
        assert_eq!(snap.percent(), 0.0);
        assert_eq!(snap.result, Value::Null);
        assert!(snap.error.is_none());
    }

    #[test]
    fn parse_failed_entry_keeps_error() {
        let snap: JobSnapshot = serde_json::from_value(json!({
            "id": 9,
            "state": "FAILED",
            "progress": { "percent": 100.0 },
            "error": "[EFAULT] disk is in use",
        }))
        .unwrap();
        assert_eq!(snap.state, JobState::Failed);
        assert_eq!(snap.error.as_deref(), Some("[EFAULT] disk is in use"));
    }

    #[test]
    fn unknown_state_is_a_parse_error() {
        let parsed: Result<JobState, _> = serde_json::from_value(json!("HOLD"));
        assert!(parsed.is_err());
    }

    #[test]
    fn job_id_is_transparent() {
        let id: JobId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(serde_json::to_value(id).unwrap(), json!(42));
        assert_eq!(id.to_string(), "42");
    }
}
