//! Progress reporting from the engine to its caller
//!
//! The engine emits [`ProgressUpdate`] values to a caller-supplied sink and
//! never touches job state itself. The job manager and the CLI provide real
//! sinks; library callers that do not care pass [`NullProgressSink`].

use serde::{Deserialize, Serialize};

/// Pipeline stage an update was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Validating,
    Reading,
    Aligning,
    Comparing,
    Finalizing,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Validating => "validating",
            ProgressStage::Reading => "reading",
            ProgressStage::Aligning => "aligning",
            ProgressStage::Comparing => "comparing",
            ProgressStage::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One progress emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    /// Overall percent in `0.0..=100.0`. Consumers apply monotonicity.
    pub percent: f32,
    /// Distinct keys processed so far
    pub rows_processed: u64,
    /// Estimated key total; revised once both sides are read
    pub rows_total: Option<u64>,
    pub message: String,
}

/// Receiver for engine progress. Called from the engine's async task between
/// pipeline stages; implementations should return quickly and must not block.
pub trait ProgressSink: Send + Sync {
    fn update(&self, update: ProgressUpdate);
}

/// Sink that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn update(&self, _update: ProgressUpdate) {}
}
