//! Job lifecycle management
//!
//! Owns every [`Job`](crate::models::Job) from submission to its terminal
//! state. The [`JobManager`] keeps an in-memory registry backed by JSON files
//! in a jobs directory, spawns engine runs on the Tokio runtime and is the
//! sole writer of job status and progress.

pub mod manager;

pub use manager::{JobManager, ManagerSettings, RUN_STATS_METADATA_KEY};

use thiserror::Error;
use uuid::Uuid;

use crate::models::JobStatus;
use crate::validation::ConfigurationError;

/// Error type for job lifecycle operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with this identifier
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Request rejected at submission, before any job was created
    #[error("Invalid comparison request: {0}")]
    Config(#[from] ConfigurationError),

    /// Operation not allowed in the job's current state
    #[error("Invalid job state: {0}")]
    InvalidState(String),

    /// Job metadata could not be read or written
    #[error("Job metadata I/O failed: {0}")]
    Io(String),
}

/// Result type for job lifecycle operations.
pub type JobResult<T> = Result<T, JobError>;

/// Selection criteria for [`JobManager::list_jobs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    /// Keep only jobs in this state
    pub status: Option<JobStatus>,
    /// Keep at most this many jobs, newest first
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
