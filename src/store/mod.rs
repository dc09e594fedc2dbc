//! Result store abstraction over embedded databases
//!
//! Differences stream into one embedded database file per job, so concurrent
//! jobs and readers never contend on a shared database. The store is
//! append-only while a job runs and read-only afterwards; [`QueryOptions`]
//! drives paged, sorted, filtered reads without loading result sets into
//! memory.

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

pub mod duckdb;
pub mod query;
pub mod schema;

pub use self::duckdb::DuckDBResultStore;
pub use query::{
    JobSummary, QueryOptions, QueryPage, SortDirection, SortKey, SortSpec,
};
pub use schema::{ResultSchema, SCHEMA_VERSION};

use crate::models::DifferenceRecord;

/// Error type for result store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to open or create a result database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No result database exists for the job
    #[error("No results for job {0}")]
    JobNotFound(Uuid),

    /// Sort specification could not be parsed
    #[error("Invalid sort specification: {0}")]
    InvalidSort(String),

    /// Filesystem-level failure
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence backend for difference rows.
///
/// The engine drives `begin_job` → `append`* → `finish_job`; each `append`
/// call is transactional, so an interrupted job leaves every previously
/// appended partition readable.
#[async_trait]
pub trait ResultStore: Send + Sync + 'static {
    /// Create the job's result database with its schema and indexes. Rows
    /// from an earlier run of the same job id are cleared.
    async fn begin_job(&self, job_id: Uuid) -> StoreResult<()>;

    /// Append one partition of difference rows.
    async fn append(&self, job_id: Uuid, records: &[DifferenceRecord]) -> StoreResult<()>;

    /// Close the job's writer handle. The database stays on disk for reads.
    async fn finish_job(&self, job_id: Uuid) -> StoreResult<()>;

    /// Read one page of differences.
    async fn query(&self, job_id: Uuid, options: &QueryOptions) -> StoreResult<QueryPage>;

    /// Aggregate counts across the job's differences.
    async fn summary(&self, job_id: Uuid) -> StoreResult<JobSummary>;

    /// Remove the job's result database from disk.
    async fn delete_results(&self, job_id: Uuid) -> StoreResult<()>;

    /// Path the job's results live at, whether or not it exists yet.
    fn result_location(&self, job_id: Uuid) -> PathBuf;
}
