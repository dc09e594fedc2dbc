//! Job manager: registry, scheduling and persistence

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as TokioMutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{CancelToken, ComparisonEngine, ProgressSink, ProgressUpdate, RunStats};
use crate::models::{ComparisonRequest, Job, JobErrorCode, JobFailure, JobStatus};
use crate::store::ResultStore;
use crate::validation::validate_request;

use super::{JobError, JobFilter, JobResult};

/// Key under which run statistics are recorded in completed job metadata.
pub const RUN_STATS_METADATA_KEY: &str = "runStats";

/// Scheduling limits for a [`JobManager`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    /// Comparisons allowed to run at once; excess submissions stay queued
    pub max_concurrent_jobs: usize,
    /// Per-job wall-clock limit; `None` means unlimited
    pub timeout: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            max_concurrent_jobs: 4,
            timeout: None,
        }
    }
}

struct JobEntry {
    job: Job,
    cancel: CancelToken,
    /// Serializes snapshot-and-write cycles so the newest state always lands
    /// on disk last
    persist_lock: Arc<TokioMutex<()>>,
}

impl JobEntry {
    fn new(job: Job, cancel: CancelToken) -> Self {
        JobEntry {
            job,
            cancel,
            persist_lock: Arc::new(TokioMutex::new(())),
        }
    }
}

type Registry = Arc<RwLock<HashMap<Uuid, JobEntry>>>;

/// Owns the job registry and runs comparisons in the background.
///
/// The manager is the sole writer of [`Job`] state. Engine runs report
/// through a sink which folds updates into the registry; status reads are
/// served from memory and never block on running jobs. Every state change is
/// mirrored to a JSON file per job under the jobs directory so the registry
/// survives restarts.
pub struct JobManager<S: ResultStore> {
    engine: Arc<ComparisonEngine<S>>,
    jobs_dir: PathBuf,
    registry: Registry,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl<S: ResultStore> JobManager<S> {
    /// Create a manager over an engine, persisting job metadata under
    /// `jobs_dir`. The directory is created if missing.
    pub fn new(engine: ComparisonEngine<S>, jobs_dir: impl Into<PathBuf>) -> JobResult<Self> {
        let jobs_dir = jobs_dir.into();
        std::fs::create_dir_all(&jobs_dir).map_err(|e| JobError::Io(e.to_string()))?;
        let defaults = ManagerSettings::default();
        Ok(JobManager {
            engine: Arc::new(engine),
            jobs_dir,
            registry: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(defaults.max_concurrent_jobs)),
            timeout: defaults.timeout,
        })
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.semaphore = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        self.timeout = settings.timeout;
        self
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    /// The result store backing this manager's engine.
    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    fn job_path(&self, job_id: Uuid) -> PathBuf {
        self.jobs_dir.join(format!("{}.json", job_id))
    }

    /// Validate a request and start a comparison job.
    ///
    /// Any [`ConfigurationError`](crate::validation::ConfigurationError) is
    /// returned before a job exists. On success the job is persisted as
    /// `queued` and the id returned immediately; the run proceeds in the
    /// background.
    pub async fn submit(&self, request: ComparisonRequest) -> JobResult<Uuid> {
        validate_request(&request)?;

        let job_id = Uuid::new_v4();
        let mut job = Job::new(job_id);
        job.metadata = request.metadata.clone();
        job.progress.message = "queued".to_string();

        let cancel = CancelToken::new();
        {
            let mut registry = lock_write(&self.registry)?;
            registry.insert(job_id, JobEntry::new(job, cancel.clone()));
        }
        if let Err(error) = persist_latest(&self.registry, &self.jobs_dir, job_id).await {
            if let Ok(mut registry) = self.registry.write() {
                registry.remove(&job_id);
            }
            return Err(error);
        }

        info!(job_id = %job_id, "Comparison job submitted");
        self.spawn_run(job_id, request, cancel);
        Ok(job_id)
    }

    fn spawn_run(&self, job_id: Uuid, request: ComparisonRequest, cancel: CancelToken) {
        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let jobs_dir = self.jobs_dir.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let outcome = Err((
                        JobErrorCode::Internal,
                        "Job scheduler shut down before the run started".to_string(),
                    ));
                    finish(&registry, &jobs_dir, job_id, outcome, None).await;
                    return;
                }
            };

            if cancel.is_cancelled() {
                let outcome = Err((
                    JobErrorCode::Cancelled,
                    "Comparison cancelled before it started".to_string(),
                ));
                finish(&registry, &jobs_dir, job_id, outcome, None).await;
                return;
            }

            let sink = ManagerSink {
                job_id,
                jobs_dir: jobs_dir.clone(),
                registry: Arc::clone(&registry),
            };
            let run = engine.run(job_id, &request, &sink, &cancel);
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result.map_err(|e| (e.error_code(), e.to_string())),
                    Err(_) => {
                        cancel.cancel();
                        Err((
                            JobErrorCode::Timeout,
                            format!("Comparison exceeded the {:?} limit", limit),
                        ))
                    }
                },
                None => run.await.map_err(|e| (e.error_code(), e.to_string())),
            };

            let location = engine.store().result_location(job_id);
            finish(&registry, &jobs_dir, job_id, outcome, Some(location)).await;
        });
    }

    /// Current state of one job, served from memory.
    pub fn get_status(&self, job_id: Uuid) -> JobResult<Job> {
        let registry = lock_read(&self.registry)?;
        registry
            .get(&job_id)
            .map(|entry| entry.job.clone())
            .ok_or(JobError::NotFound(job_id))
    }

    /// Jobs matching the filter, newest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> JobResult<Vec<Job>> {
        let mut jobs: Vec<Job> = {
            let registry = lock_read(&self.registry)?;
            registry
                .values()
                .filter(|entry| filter.status.is_none_or(|status| entry.job.status == status))
                .map(|entry| entry.job.clone())
                .collect()
        };
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    /// Request cooperative cancellation of a queued or running job.
    ///
    /// The job fails with code `cancelled` once the engine observes the token
    /// at the next partition boundary.
    pub fn cancel(&self, job_id: Uuid) -> JobResult<()> {
        let registry = lock_read(&self.registry)?;
        let entry = registry.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        if entry.job.status.is_terminal() {
            return Err(JobError::InvalidState(format!(
                "Job {} is already {}",
                job_id, entry.job.status
            )));
        }
        entry.cancel.cancel();
        info!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    /// Remove a terminal job's metadata and result database.
    ///
    /// Queued and running jobs are refused; cancel them and wait for the
    /// terminal state first.
    pub async fn delete_job(&self, job_id: Uuid) -> JobResult<()> {
        let known = {
            let registry = lock_read(&self.registry)?;
            match registry.get(&job_id) {
                Some(entry) if !entry.job.status.is_terminal() => {
                    return Err(JobError::InvalidState(format!(
                        "Job {} is {}; it must finish before deletion",
                        job_id, entry.job.status
                    )));
                }
                Some(_) => true,
                None => false,
            }
        };

        let metadata_existed = match tokio::fs::remove_file(self.job_path(job_id)).await {
            Ok(()) => true,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
            Err(error) => return Err(JobError::Io(error.to_string())),
        };
        if !known && !metadata_existed {
            return Err(JobError::NotFound(job_id));
        }

        self.engine
            .store()
            .delete_results(job_id)
            .await
            .map_err(|e| JobError::Io(e.to_string()))?;

        if let Ok(mut registry) = self.registry.write() {
            registry.remove(&job_id);
        }
        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Load persisted jobs from the jobs directory into the registry.
    ///
    /// Jobs left `queued` or `running` by an earlier process are marked
    /// `failed` as interrupted. Returns the number of jobs loaded;
    /// unreadable files are skipped with a warning.
    pub async fn reload(&self) -> JobResult<usize> {
        let mut dir = tokio::fs::read_dir(&self.jobs_dir)
            .await
            .map_err(|e| JobError::Io(e.to_string()))?;
        let mut loaded = 0usize;

        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| JobError::Io(e.to_string()))?
        {
            let path = dirent.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(error) => {
                    warn!(path = %path.display(), "Skipping unreadable job file: {}", error);
                    continue;
                }
            };
            let mut job: Job = match serde_json::from_str(&content) {
                Ok(job) => job,
                Err(error) => {
                    warn!(path = %path.display(), "Skipping corrupt job file: {}", error);
                    continue;
                }
            };

            let interrupted = !job.status.is_terminal();
            if interrupted {
                let previous = job.status;
                let now = Utc::now();
                job.status = JobStatus::Failed;
                job.error = Some(JobFailure {
                    code: JobErrorCode::Internal,
                    message: format!("Interrupted: the process exited while the job was {}", previous),
                });
                job.completed_at = Some(now);
                job.updated_at = now;
            }

            let job_id = job.job_id;
            let inserted = {
                let mut registry = lock_write(&self.registry)?;
                match registry.entry(job_id) {
                    std::collections::hash_map::Entry::Occupied(_) => false,
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(JobEntry::new(job, CancelToken::new()));
                        true
                    }
                }
            };
            if inserted {
                if interrupted {
                    persist_latest(&self.registry, &self.jobs_dir, job_id).await?;
                }
                loaded += 1;
            }
        }

        info!(count = loaded, "Reloaded persisted jobs");
        Ok(loaded)
    }
}

/// Folds engine progress into the registry. The manager owns all job state;
/// percent never decreases and terminal jobs are never touched.
struct ManagerSink {
    job_id: Uuid,
    jobs_dir: PathBuf,
    registry: Registry,
}

impl ProgressSink for ManagerSink {
    fn update(&self, update: ProgressUpdate) {
        {
            let Ok(mut registry) = self.registry.write() else {
                return;
            };
            let Some(entry) = registry.get_mut(&self.job_id) else {
                return;
            };
            if entry.job.status.is_terminal() {
                return;
            }
            if entry.job.status == JobStatus::Queued {
                entry.job.status = JobStatus::Running;
                entry.job.started_at = Some(Utc::now());
            }
            let progress = &mut entry.job.progress;
            if update.percent > progress.percent {
                progress.percent = update.percent;
            }
            progress.rows_processed = update.rows_processed;
            if update.rows_total.is_some() {
                progress.rows_total = update.rows_total;
            }
            progress.message = update.message;
            entry.job.updated_at = Utc::now();
        }

        let registry = Arc::clone(&self.registry);
        let jobs_dir = self.jobs_dir.clone();
        let job_id = self.job_id;
        tokio::spawn(async move {
            if let Err(error) = persist_latest(&registry, &jobs_dir, job_id).await {
                debug!(job_id = %job_id, "Deferred job persist failed: {}", error);
            }
        });
    }
}

/// Apply the terminal transition for a finished run and persist it.
async fn finish(
    registry: &Registry,
    jobs_dir: &Path,
    job_id: Uuid,
    outcome: Result<RunStats, (JobErrorCode, String)>,
    location: Option<PathBuf>,
) {
    {
        let Ok(mut guard) = registry.write() else {
            warn!(job_id = %job_id, "Registry lock poisoned; job outcome not recorded");
            return;
        };
        let Some(entry) = guard.get_mut(&job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }

        let now = Utc::now();
        entry.job.updated_at = now;
        entry.job.completed_at = Some(now);
        match outcome {
            Ok(stats) => {
                entry.job.status = JobStatus::Completed;
                entry.job.progress.percent = 100.0;
                entry.job.progress.message = "completed".to_string();
                entry.job.result_location = location;
                if let Ok(value) = serde_json::to_value(&stats) {
                    entry.job.metadata.insert(RUN_STATS_METADATA_KEY.to_string(), value);
                }
                info!(
                    job_id = %job_id,
                    differences = stats.total_differences,
                    duration_ms = stats.duration_ms,
                    "Comparison job completed"
                );
            }
            Err((code, message)) => {
                entry.job.status = JobStatus::Failed;
                warn!(job_id = %job_id, code = %code, "Comparison job failed: {}", message);
                entry.job.error = Some(JobFailure { code, message });
            }
        }
    }

    if let Err(error) = persist_latest(registry, jobs_dir, job_id).await {
        warn!(job_id = %job_id, "Failed to persist job metadata: {}", error);
    }
}

/// Write the registry's current snapshot of one job to its JSON file.
///
/// Snapshot and write happen under the job's persist lock, so concurrent
/// persists cannot leave an older snapshot on disk. A job missing from the
/// registry (deleted) is a no-op.
async fn persist_latest(registry: &Registry, jobs_dir: &Path, job_id: Uuid) -> JobResult<()> {
    let persist_lock = {
        let guard = lock_read(registry)?;
        match guard.get(&job_id) {
            Some(entry) => Arc::clone(&entry.persist_lock),
            None => return Ok(()),
        }
    };
    let _serialized = persist_lock.lock().await;

    let snapshot = {
        let guard = lock_read(registry)?;
        match guard.get(&job_id) {
            Some(entry) => entry.job.clone(),
            None => return Ok(()),
        }
    };
    let content =
        serde_json::to_string_pretty(&snapshot).map_err(|e| JobError::Io(e.to_string()))?;
    tokio::fs::write(jobs_dir.join(format!("{}.json", job_id)), content)
        .await
        .map_err(|e| JobError::Io(e.to_string()))
}

fn lock_read(registry: &Registry) -> JobResult<std::sync::RwLockReadGuard<'_, HashMap<Uuid, JobEntry>>> {
    registry
        .read()
        .map_err(|e| JobError::Io(format!("Lock error: {}", e)))
}

fn lock_write(registry: &Registry) -> JobResult<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, JobEntry>>> {
    registry
        .write()
        .map_err(|e| JobError::Io(format!("Lock error: {}", e)))
}
