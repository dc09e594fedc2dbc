//! Comparison requests and per-job comparison settings

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::dataset::DatasetDescriptor;

/// How duplicate comparison keys within one side are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Abort the run on the first duplicate key (the default; silent
    /// collapse changes output cardinality)
    #[default]
    Fail,
    /// Keep the first occurrence in input order, count the rest
    KeepFirst,
    /// Keep the last occurrence in input order, count the rest
    KeepLast,
}

impl std::fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateKeyPolicy::Fail => write!(f, "fail"),
            DuplicateKeyPolicy::KeepFirst => write!(f, "keep_first"),
            DuplicateKeyPolicy::KeepLast => write!(f, "keep_last"),
        }
    }
}

/// Per-job comparison settings.
///
/// `epsilon` is deliberately optional in the serialized form so that its
/// absence is reported as a submission-time configuration error instead of a
/// deserialization failure; there is no built-in default tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompareConfig {
    /// Absolute tolerance for numeric equality; required, no default
    pub epsilon: Option<f64>,
    /// Case-insensitive text comparison
    #[serde(default)]
    pub ignore_case: bool,
    /// Trim surrounding whitespace before text comparison
    #[serde(default)]
    pub trim_strings: bool,
    /// Duplicate-key resolution policy
    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
}

/// Submission payload for one comparison job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    /// Source-side dataset (side A)
    pub source: DatasetDescriptor,
    /// Target-side dataset (side B)
    pub target: DatasetDescriptor,
    /// Comparison settings
    pub compare: CompareConfig,
    /// Free-form labels carried onto the job metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}
