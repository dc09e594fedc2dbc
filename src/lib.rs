//! Data Comparison SDK - Comparison and reconciliation engine for data migrations
//!
//! Provides unified interfaces for:
//! - Declaring tabular datasets and how to normalize them (column maps, type
//!   overrides, derived columns)
//! - Aligning two datasets on composite comparison keys
//! - Classifying per-field differences with explicit numeric tolerance
//! - Running comparisons as background jobs with progress, cancellation and
//!   persistence
//! - Storing and querying difference reports in embedded DuckDB databases

pub mod align;
pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod models;
pub mod normalize;
pub mod store;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use cache::DatasetCache;
pub use config::{ComparisonConfig, ConfigError};
pub use engine::{
    CancelToken, ComparisonEngine, EngineError, EngineSettings, NullProgressSink, ProgressSink,
    ProgressStage, ProgressUpdate, RunStats,
};
pub use jobs::{JobError, JobFilter, JobManager, ManagerSettings};
pub use store::{
    DuckDBResultStore, JobSummary, QueryOptions, QueryPage, ResultStore, SortSpec, StoreError,
};
pub use validation::{ConfigurationError, ConfigurationResult, validate_request};

// Re-export models
pub use models::{
    CompareConfig, ComparisonRequest, DatasetDescriptor, DifferenceRecord, DifferenceType,
    DuplicateKeyPolicy, Job, JobStatus, ScalarValue,
};
