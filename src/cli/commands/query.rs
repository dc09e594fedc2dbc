//! Result query commands: page through and summarize recorded differences

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::models::DifferenceRecord;
use crate::store::{QueryOptions, QueryPage, ResultStore, SortSpec};

use super::jobs::parse_job_id;
use super::{OutputFormat, open_store, runtime};

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    /// Job id
    pub job_id: String,
    /// Workspace path
    pub workspace: PathBuf,
    /// Page number (1-based)
    pub page: usize,
    /// Rows per page
    pub page_size: usize,
    /// Sort specification, e.g. "field_name, comparison_key DESC"
    pub sort: Option<String>,
    /// Difference type filter
    pub difference_type: Option<String>,
    /// Field name filter
    pub field: Option<String>,
    /// Output format
    pub format: String,
}

/// Page through the differences recorded for a job.
pub fn handle_query(args: &QueryArgs) -> Result<(), CliError> {
    let job_id = parse_job_id(&args.job_id)?;
    let format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let mut options = QueryOptions {
        page: args.page,
        page_size: args.page_size,
        ..QueryOptions::default()
    };
    if let Some(sort) = &args.sort {
        options.sort = Some(SortSpec::parse(sort)?);
    }
    if let Some(kind) = &args.difference_type {
        options.difference_type = Some(
            kind.parse()
                .map_err(|e: String| CliError::InvalidArgument(e))?,
        );
    }
    options.field_name = args.field.clone();

    let (_config, store) = open_store(&args.workspace)?;
    let rt = runtime()?;
    let page = rt.block_on(store.query(job_id, &options))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&page).map_err(|e| CliError::IoError(e.to_string()))?
        ),
        OutputFormat::Csv => write_csv(&page.records)?,
        OutputFormat::Table => {
            print_differences_table(&page);
            eprintln!(
                "\nPage {} of {} ({} differences)",
                page.page, page.total_pages, page.total_count
            );
        }
    }
    Ok(())
}

/// Summary command arguments
#[derive(Debug, Clone)]
pub struct SummaryArgs {
    /// Job id
    pub job_id: String,
    /// Workspace path
    pub workspace: PathBuf,
    /// Output format
    pub format: String,
}

/// Summarize the differences recorded for a job.
pub fn handle_summary(args: &SummaryArgs) -> Result<(), CliError> {
    let job_id = parse_job_id(&args.job_id)?;
    let format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let (_config, store) = open_store(&args.workspace)?;
    let rt = runtime()?;
    let summary = rt.block_on(store.summary(job_id))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary).map_err(|e| CliError::IoError(e.to_string()))?
        ),
        _ => {
            println!("Total differences:   {}", summary.total_differences);
            println!("Value mismatches:    {}", summary.value_mismatches);
            println!("Missing in source:   {}", summary.missing_in_source);
            println!("Missing in target:   {}", summary.missing_in_target);
            println!("Distinct keys:       {}", summary.distinct_keys);
            println!("Distinct fields:     {}", summary.distinct_fields);
            if !summary.mismatches_by_field.is_empty() {
                println!();
                println!("Mismatches by field:");
                for (field, count) in &summary.mismatches_by_field {
                    println!("  {:<28} {}", field, count);
                }
            }
        }
    }
    Ok(())
}

fn print_differences_table(page: &QueryPage) {
    if page.records.is_empty() {
        println!("No differences found");
        return;
    }
    println!(
        "{:<24}  {:<20}  {:<17}  {:<24}  {:<24}",
        "KEY", "FIELD", "TYPE", "SOURCE", "TARGET"
    );
    for record in &page.records {
        println!(
            "{:<24}  {:<20}  {:<17}  {:<24}  {:<24}",
            truncate(&record.comparison_key, 24),
            truncate(&record.field_name, 20),
            record.difference_type.as_str(),
            truncate(&record.source_value, 24),
            truncate(&record.target_value, 24)
        );
    }
}

fn write_csv(records: &[DifferenceRecord]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer
        .write_record([
            "comparison_key",
            "record_id_a",
            "record_id_b",
            "field_name",
            "source_value",
            "target_value",
            "difference_type",
            "report_timestamp",
        ])
        .map_err(|e| CliError::IoError(e.to_string()))?;
    for record in records {
        let timestamp = record.report_timestamp.to_rfc3339();
        writer
            .write_record([
                record.comparison_key.as_str(),
                record.record_id_a.as_deref().unwrap_or(""),
                record.record_id_b.as_deref().unwrap_or(""),
                record.field_name.as_str(),
                record.source_value.as_str(),
                record.target_value.as_str(),
                record.difference_type.as_str(),
                timestamp.as_str(),
            ])
            .map_err(|e| CliError::IoError(e.to_string()))?;
    }
    writer.flush().map_err(|e| CliError::IoError(e.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
