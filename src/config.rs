//! Configuration file support
//!
//! Handles parsing of `.data-comparison.toml` configuration files and
//! environment variable overrides. Every section is optional; defaults give a
//! working local setup under the current directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::EngineSettings;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".data-comparison.toml";

/// Default directory for persisted job metadata
pub const DEFAULT_JOBS_DIR: &str = ".data-comparison/jobs";

/// Default directory for result databases
pub const DEFAULT_RESULTS_DIR: &str = ".data-comparison/results";

/// Environment variable overriding the jobs directory
pub const ENV_JOBS_DIR: &str = "DATA_COMPARISON_JOBS_DIR";

/// Environment variable overriding the results directory
pub const ENV_RESULTS_DIR: &str = "DATA_COMPARISON_RESULTS_DIR";

/// Environment variable overriding the concurrent job cap
pub const ENV_MAX_CONCURRENT_JOBS: &str = "DATA_COMPARISON_MAX_CONCURRENT_JOBS";

/// Environment variable overriding the per-job timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "DATA_COMPARISON_TIMEOUT_SECS";

/// Environment variable overriding the partition count
pub const ENV_PARTITION_COUNT: &str = "DATA_COMPARISON_PARTITION_COUNT";

/// Error type for configuration file handling.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Failed to read config: {0}")]
    Io(String),

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Config could not be rendered back to TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Filesystem layout section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsSection {
    /// Directory for persisted job metadata (relative to the base directory,
    /// or absolute)
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: String,

    /// Directory for per-job result databases
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

fn default_jobs_dir() -> String {
    DEFAULT_JOBS_DIR.to_string()
}

fn default_results_dir() -> String {
    DEFAULT_RESULTS_DIR.to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            results_dir: default_results_dir(),
        }
    }
}

/// Job lifecycle section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsSection {
    /// Comparisons allowed to run at once; excess submissions stay queued
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Per-job wall-clock limit; absent means unlimited
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            timeout_secs: None,
        }
    }
}

/// Dataset cache section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Cache normalized sides between jobs
    #[serde(default)]
    pub enabled: bool,

    /// Normalized sides held in memory
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CACHE_CAPACITY
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_cache_capacity(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `.data-comparison.toml` configuration file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComparisonConfig {
    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsSection,

    /// Engine tunables
    #[serde(default)]
    pub engine: EngineSettings,

    /// Job lifecycle limits
    #[serde(default)]
    pub jobs: JobsSection,

    /// Dataset cache
    #[serde(default)]
    pub cache: CacheSection,
}

impl ComparisonConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a base directory
    ///
    /// Looks for `.data-comparison.toml` in the directory, falling back to
    /// defaults when absent, then applies environment variable overrides.
    pub fn load(base_dir: &Path) -> ConfigResult<Self> {
        let config_path = base_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a base directory
    pub fn save(&self, base_dir: &Path) -> ConfigResult<()> {
        let config_path = base_dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source. Unparseable values
    /// are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_JOBS_DIR) {
            self.paths.jobs_dir = dir;
        }
        if let Some(dir) = lookup(ENV_RESULTS_DIR) {
            self.paths.results_dir = dir;
        }
        if let Some(cap) = lookup(ENV_MAX_CONCURRENT_JOBS)
            && let Ok(cap) = cap.parse()
        {
            self.jobs.max_concurrent_jobs = cap;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS)
            && let Ok(secs) = secs.parse()
        {
            self.jobs.timeout_secs = Some(secs);
        }
        if let Some(count) = lookup(ENV_PARTITION_COUNT)
            && let Ok(count) = count.parse()
        {
            self.engine.partition_count = count;
        }
    }

    /// Resolve the jobs directory against a base directory
    pub fn jobs_dir(&self, base_dir: &Path) -> PathBuf {
        resolve_dir(&self.paths.jobs_dir, base_dir)
    }

    /// Resolve the results directory against a base directory
    pub fn results_dir(&self, base_dir: &Path) -> PathBuf {
        resolve_dir(&self.paths.results_dir, base_dir)
    }

    /// Check if a configuration file exists in a base directory
    pub fn exists(base_dir: &Path) -> bool {
        base_dir.join(CONFIG_FILENAME).exists()
    }
}

fn resolve_dir(configured: &str, base_dir: &Path) -> PathBuf {
    if Path::new(configured).is_absolute() {
        PathBuf::from(configured)
    } else {
        base_dir.join(configured)
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Data Comparison SDK Configuration
# This file configures job storage and engine behavior.

[paths]
# Directory for persisted job metadata (relative to this file, or absolute)
jobs_dir = ".data-comparison/jobs"

# Directory for per-job result databases
results_dir = ".data-comparison/results"

[engine]
# Key buckets per side; bounds peak memory during alignment
partition_count = 16

# Transient read/store failures tolerated per operation
io_retry_attempts = 3

# Delay between retry attempts, in milliseconds
io_retry_backoff_ms = 250

[jobs]
# Comparisons allowed to run at once; excess submissions stay queued
max_concurrent_jobs = 4

# Per-job wall-clock limit in seconds (commented out = unlimited)
# timeout_secs = 3600

[cache]
# Cache normalized datasets between jobs
enabled = false

# Normalized datasets held in memory
capacity = 4
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ComparisonConfig::new();
        assert_eq!(config.paths.jobs_dir, DEFAULT_JOBS_DIR);
        assert_eq!(config.paths.results_dir, DEFAULT_RESULTS_DIR);
        assert_eq!(config.jobs.max_concurrent_jobs, 4);
        assert_eq!(config.jobs.timeout_secs, None);
        assert_eq!(config.engine.partition_count, 16);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[paths]
jobs_dir = "/var/lib/comparison/jobs"

[jobs]
max_concurrent_jobs = 2
timeout_secs = 600
"#;
        let config = ComparisonConfig::parse(toml).unwrap();
        assert_eq!(config.paths.jobs_dir, "/var/lib/comparison/jobs");
        assert_eq!(config.paths.results_dir, DEFAULT_RESULTS_DIR);
        assert_eq!(config.jobs.max_concurrent_jobs, 2);
        assert_eq!(config.jobs.timeout_secs, Some(600));
        assert_eq!(config.engine.io_retry_attempts, 3);
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(matches!(
            ComparisonConfig::parse("jobs = nonsense ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut config = ComparisonConfig::new();
        config.jobs.max_concurrent_jobs = 7;
        config.engine.partition_count = 32;

        config.save(dir.path()).unwrap();
        assert!(ComparisonConfig::exists(dir.path()));

        let loaded = ComparisonConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.jobs.max_concurrent_jobs, 7);
        assert_eq!(loaded.engine.partition_count, 32);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_JOBS_DIR, "/tmp/jobs"),
            (ENV_MAX_CONCURRENT_JOBS, "9"),
            (ENV_TIMEOUT_SECS, "120"),
            (ENV_PARTITION_COUNT, "not-a-number"),
        ]);

        let mut config = ComparisonConfig::new();
        config.apply_env_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.paths.jobs_dir, "/tmp/jobs");
        assert_eq!(config.jobs.max_concurrent_jobs, 9);
        assert_eq!(config.jobs.timeout_secs, Some(120));
        // Bad values are ignored
        assert_eq!(config.engine.partition_count, 16);
    }

    #[test]
    fn test_path_resolution() {
        let config = ComparisonConfig::new();
        let base = Path::new("/workspace");
        assert_eq!(
            config.jobs_dir(base),
            PathBuf::from("/workspace/.data-comparison/jobs")
        );

        let mut absolute = ComparisonConfig::new();
        absolute.paths.results_dir = "/var/results".to_string();
        assert_eq!(absolute.results_dir(base), PathBuf::from("/var/results"));
    }

    #[test]
    fn test_sample_config_is_valid() {
        let sample = sample_config();
        let result = ComparisonConfig::parse(sample);
        assert!(result.is_ok(), "Sample config should be valid TOML");
    }
}
