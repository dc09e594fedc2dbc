//! Job metadata owned by the job lifecycle manager

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a comparison job.
///
/// `Completed` and `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!(
                "Unknown job status: {} (expected queued, running, completed or failed)",
                s
            )),
        }
    }
}

/// Stable, classifiable failure code recorded on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorCode {
    /// Side-level normalization failure (input unusable)
    Normalization,
    /// Duplicate comparison key under the fail policy
    DuplicateKey,
    /// Input read failure after bounded retries
    Io,
    /// Result store failure after bounded retries
    Storage,
    /// Cooperative cancellation honored at a partition boundary
    Cancelled,
    /// Wall-clock timeout exceeded
    Timeout,
    /// Unexpected internal failure
    Internal,
}

impl std::fmt::Display for JobErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            JobErrorCode::Normalization => "normalization",
            JobErrorCode::DuplicateKey => "duplicate_key",
            JobErrorCode::Io => "io",
            JobErrorCode::Storage => "storage",
            JobErrorCode::Cancelled => "cancelled",
            JobErrorCode::Timeout => "timeout",
            JobErrorCode::Internal => "internal",
        };
        write!(f, "{}", code)
    }
}

/// Terminal failure details, present only on failed jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: JobErrorCode,
    pub message: String,
}

/// Progress of a running job, written solely by the job lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Monotonically non-decreasing percent in `0.0..=100.0`
    pub percent: f32,
    /// Distinct comparison keys processed so far
    pub rows_processed: u64,
    /// Estimated total keys; revised once both sides are read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_total: Option<u64>,
    /// Human-readable stage message
    #[serde(default)]
    pub message: String,
}

/// One end-to-end comparison run with its own lifecycle and output location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<PathBuf>,
    /// Free-form labels recorded at submission plus run statistics on
    /// completion
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    /// Fresh queued job.
    pub fn new(job_id: Uuid) -> Self {
        let now = Utc::now();
        Job {
            job_id,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            error: None,
            result_location: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_error_code_wire_form() {
        assert_eq!(JobErrorCode::DuplicateKey.to_string(), "duplicate_key");
        let json = serde_json::to_string(&JobErrorCode::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_new_job_is_queued_without_error() {
        let job = Job::new(Uuid::new_v4());
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());
        assert!(job.result_location.is_none());
        assert_eq!(job.progress.percent, 0.0);
    }
}
