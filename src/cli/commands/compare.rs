//! Compare command: submit a comparison and watch it to completion

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use crate::cli::error::CliError;
use crate::engine::RunStats;
use crate::jobs::{JobManager, RUN_STATS_METADATA_KEY};
use crate::models::{Job, JobErrorCode, JobFailure, JobStatus};
use crate::store::DuckDBResultStore;

use super::{build_manager, load_request};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Compare command arguments
#[derive(Debug, Clone)]
pub struct CompareArgs {
    /// Request file (YAML or JSON), or '-' for stdin
    pub request: PathBuf,
    /// Workspace path
    pub workspace: PathBuf,
    /// Suppress the progress bar
    pub quiet: bool,
}

/// Run one comparison in the foreground.
///
/// The job is submitted to an in-process manager and polled until it reaches
/// a terminal state; Ctrl-C requests cooperative cancellation instead of
/// killing the run outright.
pub fn handle_compare(args: &CompareArgs) -> Result<(), CliError> {
    let request = load_request(&args.request)?;
    let manager = build_manager(&args.workspace)?;

    let rt = super::runtime()?;
    rt.block_on(async {
        let job_id = manager.submit(request).await?;
        eprintln!("Submitted job {}", job_id);

        let job = watch(&manager, job_id, args.quiet).await?;
        if job.status == JobStatus::Completed {
            print_completion(&job);
            Ok(())
        } else {
            let failure = job.error.unwrap_or_else(|| JobFailure {
                code: JobErrorCode::Internal,
                message: format!("job ended as {}", job.status),
            });
            Err(CliError::JobFailed(failure))
        }
    })
}

async fn watch(
    manager: &JobManager<DuckDBResultStore>,
    job_id: Uuid,
    quiet: bool,
) -> Result<Job, CliError> {
    let bar = if quiet {
        None
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(progress_style());
        bar.set_prefix("Comparing");
        Some(bar)
    };

    loop {
        let job = manager.get_status(job_id)?;
        if let Some(bar) = &bar {
            bar.set_position(job.progress.percent.round() as u64);
            bar.set_message(job.progress.message.clone());
        }
        if job.status.is_terminal() {
            if let Some(bar) = &bar {
                bar.finish_and_clear();
            }
            return Ok(job);
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupt received; cancelling job {}", job_id);
                let _ = manager.cancel(job_id);
            }
        }
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:10} [{bar:40}] {percent:>3}% {msg}")
        .expect("Invalid progress template")
        .progress_chars("█ ")
}

fn print_completion(job: &Job) {
    println!("Job {} completed", job.job_id);
    if let Some(value) = job.metadata.get(RUN_STATS_METADATA_KEY)
        && let Ok(stats) = serde_json::from_value::<RunStats>(value.clone())
    {
        println!("  Keys compared:      {}", stats.distinct_keys);
        println!("  Matched pairs:      {}", stats.matched_pairs);
        println!("  Value mismatches:   {}", stats.value_mismatches);
        println!("  Missing in source:  {}", stats.missing_in_source);
        println!("  Missing in target:  {}", stats.missing_in_target);
        println!("  Total differences:  {}", stats.total_differences);
        println!(
            "  Duration:           {}ms ({:.0} keys/s)",
            stats.duration_ms,
            stats.keys_per_second()
        );
    }
    if let Some(location) = &job.result_location {
        println!("  Results:            {}", location.display());
    }
}
