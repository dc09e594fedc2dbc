//! CLI binary entry point for data-comparison-cli

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use data_comparison_sdk::cli::commands::compare::{CompareArgs, handle_compare};
#[cfg(feature = "cli")]
use data_comparison_sdk::cli::commands::config::{
    ConfigInitArgs, ConfigShowArgs, handle_config_init, handle_config_show,
};
#[cfg(feature = "cli")]
use data_comparison_sdk::cli::commands::jobs::{
    JobsDeleteArgs, JobsListArgs, JobsShowArgs, handle_jobs_delete, handle_jobs_list,
    handle_jobs_show,
};
#[cfg(feature = "cli")]
use data_comparison_sdk::cli::commands::query::{
    QueryArgs, SummaryArgs, handle_query, handle_summary,
};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "data-comparison-cli")]
#[command(about = "Run and inspect dataset comparison jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Run a comparison described by a request file and wait for it
    Compare {
        /// Request file (YAML or JSON), or '-' for stdin
        request: PathBuf,
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Suppress the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Inspect and manage comparison jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },

    /// Page through the differences recorded for a job
    Query {
        /// Job id
        job_id: String,
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Page number (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Rows per page (max 1000)
        #[arg(long, default_value_t = 100)]
        page_size: usize,
        /// Sort specification, e.g. "field_name, comparison_key DESC"
        #[arg(short, long)]
        sort: Option<String>,
        /// Keep only one difference type (value_mismatch, missing_in_source, missing_in_target)
        #[arg(short = 't', long = "type")]
        difference_type: Option<String>,
        /// Keep only differences in one field
        #[arg(long)]
        field: Option<String>,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Summarize the differences recorded for a job
    Summary {
        /// Job id
        job_id: String,
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum JobsCommands {
    /// List known jobs, newest first
    List {
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Keep only jobs with this status (queued, running, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        /// Show at most this many jobs
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show one job in detail
    Show {
        /// Job id
        job_id: String,
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Delete a finished job's metadata and results
    Delete {
        /// Job id
        job_id: String,
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a documented sample configuration file
    Init {
        /// Workspace path
        #[arg(default_value = ".")]
        workspace: PathBuf,
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Workspace path
        #[arg(default_value = ".")]
        workspace: PathBuf,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare {
            request,
            workspace,
            quiet,
        } => handle_compare(&CompareArgs {
            request,
            workspace,
            quiet,
        }),

        Commands::Jobs { command } => match command {
            JobsCommands::List {
                workspace,
                status,
                limit,
                format,
            } => handle_jobs_list(&JobsListArgs {
                workspace,
                status,
                limit,
                format,
            }),
            JobsCommands::Show {
                job_id,
                workspace,
                format,
            } => handle_jobs_show(&JobsShowArgs {
                job_id,
                workspace,
                format,
            }),
            JobsCommands::Delete { job_id, workspace } => {
                handle_jobs_delete(&JobsDeleteArgs { job_id, workspace })
            }
        },

        Commands::Query {
            job_id,
            workspace,
            page,
            page_size,
            sort,
            difference_type,
            field,
            format,
        } => handle_query(&QueryArgs {
            job_id,
            workspace,
            page,
            page_size,
            sort,
            difference_type,
            field,
            format,
        }),

        Commands::Summary {
            job_id,
            workspace,
            format,
        } => handle_summary(&SummaryArgs {
            job_id,
            workspace,
            format,
        }),

        Commands::Config { command } => match command {
            ConfigCommands::Init { workspace, force } => {
                handle_config_init(&ConfigInitArgs { workspace, force })
            }
            ConfigCommands::Show { workspace } => handle_config_show(&ConfigShowArgs { workspace }),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
