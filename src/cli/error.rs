//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::models::JobFailure;
use crate::store::StoreError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read file {0}: {1}")]
    FileReadError(PathBuf, String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Job error: {0}")]
    JobError(#[from] JobError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Comparison failed ({}): {}", .0.code, .0.message)]
    JobFailed(JobFailure),

    #[error("IO error: {0}")]
    IoError(String),
}
