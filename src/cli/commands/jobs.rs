//! Job management commands: list, show, delete

use std::path::PathBuf;

use uuid::Uuid;

use crate::cli::error::CliError;
use crate::jobs::JobFilter;
use crate::models::{Job, JobStatus};

use super::{OutputFormat, build_manager, runtime};

/// Jobs list command arguments
#[derive(Debug, Clone)]
pub struct JobsListArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Status filter
    pub status: Option<String>,
    /// Maximum number of jobs to show
    pub limit: Option<usize>,
    /// Output format
    pub format: String,
}

pub fn handle_jobs_list(args: &JobsListArgs) -> Result<(), CliError> {
    let format = parse_format(&args.format)?;

    let mut filter = JobFilter::default();
    if let Some(status) = &args.status {
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| CliError::InvalidArgument(e))?;
        filter = filter.with_status(status);
    }
    if let Some(limit) = args.limit {
        filter = filter.with_limit(limit);
    }

    let manager = build_manager(&args.workspace)?;
    let rt = runtime()?;
    let jobs = rt.block_on(async {
        manager.reload().await?;
        Ok::<_, CliError>(manager.list_jobs(&filter)?)
    })?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&jobs).map_err(|e| CliError::IoError(e.to_string()))?
        ),
        OutputFormat::Table => print_jobs_table(&jobs),
        OutputFormat::Csv => {
            return Err(CliError::InvalidArgument(
                "csv output is only available for query results".to_string(),
            ));
        }
    }
    Ok(())
}

/// Jobs show command arguments
#[derive(Debug, Clone)]
pub struct JobsShowArgs {
    /// Job id
    pub job_id: String,
    /// Workspace path
    pub workspace: PathBuf,
    /// Output format
    pub format: String,
}

pub fn handle_jobs_show(args: &JobsShowArgs) -> Result<(), CliError> {
    let job_id = parse_job_id(&args.job_id)?;
    let format = parse_format(&args.format)?;

    let manager = build_manager(&args.workspace)?;
    let rt = runtime()?;
    let job = rt.block_on(async {
        manager.reload().await?;
        Ok::<_, CliError>(manager.get_status(job_id)?)
    })?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&job).map_err(|e| CliError::IoError(e.to_string()))?
        ),
        _ => print_job_detail(&job),
    }
    Ok(())
}

/// Jobs delete command arguments
#[derive(Debug, Clone)]
pub struct JobsDeleteArgs {
    /// Job id
    pub job_id: String,
    /// Workspace path
    pub workspace: PathBuf,
}

pub fn handle_jobs_delete(args: &JobsDeleteArgs) -> Result<(), CliError> {
    let job_id = parse_job_id(&args.job_id)?;

    let manager = build_manager(&args.workspace)?;
    let rt = runtime()?;
    rt.block_on(async {
        manager.reload().await?;
        manager.delete_job(job_id).await?;
        Ok::<_, CliError>(())
    })?;

    println!("Deleted job {}", job_id);
    Ok(())
}

pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, CliError> {
    Uuid::parse_str(raw).map_err(|_| CliError::InvalidJobId(raw.to_string()))
}

fn parse_format(raw: &str) -> Result<OutputFormat, CliError> {
    raw.parse().map_err(|e: String| CliError::InvalidArgument(e))
}

fn print_jobs_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found");
        return;
    }
    println!(
        "{:<36}  {:<9}  {:<19}  {:>7}  {}",
        "JOB ID", "STATUS", "CREATED", "PERCENT", "MESSAGE"
    );
    for job in jobs {
        let message = match &job.error {
            Some(failure) => format!("{}: {}", failure.code, failure.message),
            None => job.progress.message.clone(),
        };
        println!(
            "{:<36}  {:<9}  {:<19}  {:>6.1}%  {}",
            job.job_id,
            job.status.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.progress.percent,
            message
        );
    }
}

fn print_job_detail(job: &Job) {
    println!("Job:        {}", job.job_id);
    println!("Status:     {}", job.status);
    println!("Created:    {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(started) = job.started_at {
        println!("Started:    {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(completed) = job.completed_at {
        println!("Completed:  {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    match job.progress.rows_total {
        Some(total) => println!(
            "Progress:   {:.1}% ({} of {} keys)",
            job.progress.percent, job.progress.rows_processed, total
        ),
        None => println!(
            "Progress:   {:.1}% ({} keys)",
            job.progress.percent, job.progress.rows_processed
        ),
    }
    if let Some(failure) = &job.error {
        println!("Error:      {}: {}", failure.code, failure.message);
    }
    if let Some(location) = &job.result_location {
        println!("Results:    {}", location.display());
    }
}
