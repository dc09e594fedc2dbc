//! Comparison engine
//!
//! Runs one comparison end to end: validate, read and normalize both sides
//! concurrently, then align, classify and persist partition by partition.
//! The engine owns no job state; it reports through a [`ProgressSink`],
//! observes a [`CancelToken`] at partition boundaries and returns [`RunStats`]
//! on success. Partial output from a failed run stays on disk.

pub mod cancel;
pub mod progress;

pub use cancel::CancelToken;
pub use progress::{NullProgressSink, ProgressSink, ProgressStage, ProgressUpdate};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::align::{AlignmentError, DEFAULT_PARTITION_COUNT, align_partition, partition_records};
use crate::cache::{DatasetCache, dataset_fingerprint};
use crate::classify::{CompareRules, classify_partition};
use crate::models::{
    CanonicalRecord, ComparisonRequest, DatasetDescriptor, DifferenceType, JobErrorCode,
};
use crate::normalize::reader::{ReadError, read_table};
use crate::normalize::{NormalizedSide, Normalizer, SideStats};
use crate::store::{ResultStore, StoreError, StoreResult};
use crate::validation::{ConfigurationError, validate_request};

/// Fatal failure of one comparison run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Normalizer or comparison rules could not be built from the request
    #[error("Normalization setup failed: {0}")]
    Normalization(#[from] ConfigurationError),

    /// Input could not be read after retries
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Duplicate key under the `fail` policy
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Result store failure after retries
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The cancel token was observed
    #[error("Comparison cancelled")]
    Cancelled,

    /// A worker task panicked or was torn down
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable job error code for this failure.
    pub fn error_code(&self) -> JobErrorCode {
        match self {
            EngineError::Normalization(_) => JobErrorCode::Normalization,
            EngineError::Read(_) => JobErrorCode::Io,
            EngineError::Alignment(_) => JobErrorCode::DuplicateKey,
            EngineError::Store(_) => JobErrorCode::Storage,
            EngineError::Cancelled => JobErrorCode::Cancelled,
            EngineError::Internal(_) => JobErrorCode::Internal,
        }
    }
}

/// Tunables for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Key buckets per side; bounds peak memory during alignment
    pub partition_count: usize,
    /// Transient store/read failures tolerated per operation
    pub io_retry_attempts: u32,
    /// Delay between retry attempts
    pub io_retry_backoff_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            partition_count: DEFAULT_PARTITION_COUNT,
            io_retry_attempts: 3,
            io_retry_backoff_ms: 250,
        }
    }
}

/// Outcome counters for one completed run. Recorded into job metadata and
/// returned to library callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub source: SideStats,
    pub target: SideStats,
    pub source_duplicates_collapsed: u64,
    pub target_duplicates_collapsed: u64,
    /// Distinct comparison keys across the union of both sides
    pub distinct_keys: u64,
    /// Keys present on both sides
    pub matched_pairs: u64,
    pub value_mismatches: u64,
    pub missing_in_source: u64,
    pub missing_in_target: u64,
    pub total_differences: u64,
    pub partitions_written: u64,
    pub duration_ms: u64,
}

impl RunStats {
    /// Distinct keys processed per second, for log and CLI reporting.
    pub fn keys_per_second(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.distinct_keys as f64 * 1000.0 / self.duration_ms as f64
    }
}

/// One-shot comparison executor over a shared result store.
pub struct ComparisonEngine<S: ResultStore> {
    store: Arc<S>,
    settings: EngineSettings,
    cache: Option<Arc<DatasetCache>>,
}

impl<S: ResultStore> ComparisonEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        ComparisonEngine {
            store,
            settings: EngineSettings::default(),
            cache: None,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach a dataset cache consulted before reading each side.
    pub fn with_cache(mut self, cache: Arc<DatasetCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one comparison to completion.
    pub async fn run(
        &self,
        job_id: Uuid,
        request: &ComparisonRequest,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<RunStats, EngineError> {
        let start = Instant::now();

        emit(sink, ProgressStage::Validating, 2.0, 0, None, "validating request");
        validate_request(request)?;
        let rules = CompareRules::try_from(&request.compare)?;
        let value_columns = Arc::new(merged_value_columns(request));
        let policy = request.compare.duplicate_keys;

        self.with_retries("begin_job", || self.store.begin_job(job_id))
            .await?;

        emit(sink, ProgressStage::Reading, 5.0, 0, None, "reading datasets");
        let (source_side, target_side) = tokio::join!(
            self.load_side(&request.source, "source"),
            self.load_side(&request.target, "target"),
        );
        let (source_side, target_side) = (source_side?, target_side?);

        let mut stats = RunStats {
            source: source_side.stats.clone(),
            target: target_side.stats.clone(),
            ..RunStats::default()
        };
        let estimated_total = source_side.records.len().max(target_side.records.len()) as u64;
        emit(
            sink,
            ProgressStage::Reading,
            20.0,
            0,
            Some(estimated_total),
            format!(
                "read {} source and {} target records",
                source_side.records.len(),
                target_side.records.len()
            ),
        );

        self.check_cancel(cancel)?;
        let partition_count = self.settings.partition_count.max(1);
        let source_records = take_records(source_side);
        let target_records = take_records(target_side);
        let (mut source_parts, mut target_parts) =
            tokio::task::spawn_blocking(move || {
                (
                    partition_records(source_records, partition_count),
                    partition_records(target_records, partition_count),
                )
            })
            .await
            .map_err(|e| EngineError::Internal(format!("Partitioning task failed: {}", e)))?;
        emit(
            sink,
            ProgressStage::Aligning,
            25.0,
            0,
            Some(estimated_total),
            format!("partitioned keys into {} buckets", partition_count),
        );

        let mut processed: u64 = 0;
        for index in 0..partition_count {
            self.check_cancel(cancel)?;

            let source_bucket = std::mem::take(&mut source_parts[index]);
            let target_bucket = std::mem::take(&mut target_parts[index]);
            let columns = Arc::clone(&value_columns);
            let (entry_count, matched, source_collapsed, target_collapsed, rows) =
                tokio::task::spawn_blocking(move || -> Result<_, EngineError> {
                    let aligned = align_partition(source_bucket, target_bucket, policy)?;
                    let rows = classify_partition(job_id, &aligned.entries, &columns, &rules);
                    let matched = aligned.entries.iter().filter(|e| e.is_matched()).count();
                    Ok((
                        aligned.entries.len() as u64,
                        matched as u64,
                        aligned.source_duplicates_collapsed,
                        aligned.target_duplicates_collapsed,
                        rows,
                    ))
                })
                .await
                .map_err(|e| EngineError::Internal(format!("Partition task failed: {}", e)))??;

            stats.matched_pairs += matched;
            stats.source_duplicates_collapsed += source_collapsed;
            stats.target_duplicates_collapsed += target_collapsed;
            for row in &rows {
                match row.difference_type {
                    DifferenceType::ValueMismatch => stats.value_mismatches += 1,
                    DifferenceType::MissingInSource => stats.missing_in_source += 1,
                    DifferenceType::MissingInTarget => stats.missing_in_target += 1,
                }
            }
            stats.total_differences += rows.len() as u64;

            self.with_retries("append", || self.store.append(job_id, &rows))
                .await?;
            stats.partitions_written += 1;
            processed += entry_count;

            emit(
                sink,
                ProgressStage::Comparing,
                25.0 + 70.0 * (index + 1) as f32 / partition_count as f32,
                processed,
                Some(estimated_total.max(processed)),
                format!("partition {}/{}", index + 1, partition_count),
            );
        }

        self.check_cancel(cancel)?;
        emit(
            sink,
            ProgressStage::Finalizing,
            95.0,
            processed,
            Some(processed),
            "closing result store",
        );
        self.with_retries("finish_job", || self.store.finish_job(job_id))
            .await?;

        stats.distinct_keys = processed;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        emit(
            sink,
            ProgressStage::Finalizing,
            100.0,
            processed,
            Some(processed),
            "comparison complete",
        );
        info!(
            job_id = %job_id,
            distinct_keys = stats.distinct_keys,
            differences = stats.total_differences,
            duration_ms = stats.duration_ms,
            "Comparison completed"
        );
        Ok(stats)
    }

    /// Read and normalize one side, via the cache when one is attached.
    async fn load_side(
        &self,
        descriptor: &DatasetDescriptor,
        side: &'static str,
    ) -> Result<Arc<NormalizedSide>, EngineError> {
        if let Some(cache) = &self.cache {
            let fingerprint = dataset_fingerprint(descriptor)?;
            if let Some(hit) = cache.get(&fingerprint) {
                info!(side, "Dataset cache hit");
                return Ok(hit);
            }
            let loaded = self.read_and_normalize(descriptor.clone(), side).await?;
            return Ok(cache.insert(fingerprint, loaded));
        }
        Ok(Arc::new(
            self.read_and_normalize(descriptor.clone(), side).await?,
        ))
    }

    async fn read_and_normalize(
        &self,
        descriptor: DatasetDescriptor,
        side: &'static str,
    ) -> Result<NormalizedSide, EngineError> {
        let retry_attempts = self.settings.io_retry_attempts;
        let backoff = Duration::from_millis(self.settings.io_retry_backoff_ms);

        tokio::task::spawn_blocking(move || -> Result<NormalizedSide, EngineError> {
            let normalizer = Normalizer::new(&descriptor, side)?;

            let mut attempt: u32 = 0;
            let table = loop {
                match read_table(&descriptor) {
                    Ok(table) => break table,
                    Err(error @ ReadError::Io { .. }) if attempt < retry_attempts => {
                        attempt += 1;
                        warn!(side, attempt, error = %error, "Read failed, retrying");
                        std::thread::sleep(backoff);
                    }
                    Err(error) => return Err(EngineError::Read(error)),
                }
            };

            Ok(normalizer.normalize_table(&table))
        })
        .await
        .map_err(|e| EngineError::Internal(format!("Reader task failed: {}", e)))?
    }

    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error)
                    if attempt < self.settings.io_retry_attempts && is_transient(&error) =>
                {
                    attempt += 1;
                    warn!(operation, attempt, error = %error, "Store operation failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.settings.io_retry_backoff_ms))
                        .await;
                }
                Err(error) => return Err(EngineError::Store(error)),
            }
        }
    }

    fn check_cancel(&self, cancel: &CancelToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Value columns compared for matched keys: source order first, then target
/// extras.
fn merged_value_columns(request: &ComparisonRequest) -> Vec<String> {
    let mut columns = request.source.value_columns.clone();
    for column in &request.target.value_columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

fn take_records(side: Arc<NormalizedSide>) -> Vec<CanonicalRecord> {
    match Arc::try_unwrap(side) {
        Ok(owned) => owned.records,
        Err(shared) => shared.records.clone(),
    }
}

fn is_transient(error: &StoreError) -> bool {
    matches!(
        error,
        StoreError::ConnectionFailed(_) | StoreError::QueryFailed(_) | StoreError::IoError(_)
    )
}

fn emit(
    sink: &dyn ProgressSink,
    stage: ProgressStage,
    percent: f32,
    rows_processed: u64,
    rows_total: Option<u64>,
    message: impl Into<String>,
) {
    sink.update(ProgressUpdate {
        stage,
        percent,
        rows_processed,
        rows_total,
        message: message.into(),
    });
}
