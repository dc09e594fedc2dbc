//! CLI command implementations

pub mod compare;
pub mod config;
pub mod jobs;
pub mod query;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::DatasetCache;
use crate::cli::error::CliError;
use crate::config::ComparisonConfig;
use crate::engine::ComparisonEngine;
use crate::jobs::{JobManager, ManagerSettings};
use crate::models::ComparisonRequest;
use crate::store::DuckDBResultStore;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!(
                "Unknown output format: {} (expected table, json or csv)",
                other
            )),
        }
    }
}

/// Load the workspace config and open its result store.
pub(crate) fn open_store(
    workspace: &Path,
) -> Result<(ComparisonConfig, DuckDBResultStore), CliError> {
    let config = ComparisonConfig::load(workspace)?;
    let store = DuckDBResultStore::new(config.results_dir(workspace))?;
    Ok((config, store))
}

/// Assemble the engine and job manager described by a workspace's config.
pub(crate) fn build_manager(workspace: &Path) -> Result<JobManager<DuckDBResultStore>, CliError> {
    let (config, store) = open_store(workspace)?;

    let mut engine = ComparisonEngine::new(Arc::new(store)).with_settings(config.engine);
    if config.cache.enabled {
        engine = engine.with_cache(Arc::new(DatasetCache::new(config.cache.capacity)));
    }

    let settings = ManagerSettings {
        max_concurrent_jobs: config.jobs.max_concurrent_jobs,
        timeout: config.jobs.timeout_secs.map(Duration::from_secs),
    };
    Ok(JobManager::new(engine, config.jobs_dir(workspace))?.with_settings(settings))
}

/// Load a comparison request from a YAML or JSON file; `-` reads YAML from
/// stdin.
pub(crate) fn load_request(path: &Path) -> Result<ComparisonRequest, CliError> {
    let (content, is_json) = if path == Path::new("-") {
        let content = std::io::read_to_string(std::io::stdin())
            .map_err(|e| CliError::IoError(e.to_string()))?;
        (content, false)
    } else {
        if !path.exists() {
            return Err(CliError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::FileReadError(path.to_path_buf(), e.to_string()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        (content, is_json)
    };

    if is_json {
        serde_json::from_str(&content)
            .map_err(|e| CliError::InvalidArgument(format!("Invalid JSON request: {}", e)))
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| CliError::InvalidArgument(format!("Invalid YAML request: {}", e)))
    }
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}
