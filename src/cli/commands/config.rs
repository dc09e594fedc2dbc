//! Configuration commands

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::config::{CONFIG_FILENAME, ComparisonConfig, sample_config};

/// Config init command arguments
#[derive(Debug, Clone)]
pub struct ConfigInitArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Overwrite an existing configuration file
    pub force: bool,
}

/// Write a documented sample configuration file into the workspace.
pub fn handle_config_init(args: &ConfigInitArgs) -> Result<(), CliError> {
    let path = args.workspace.join(CONFIG_FILENAME);
    if path.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    std::fs::create_dir_all(&args.workspace).map_err(|e| CliError::IoError(e.to_string()))?;
    std::fs::write(&path, sample_config()).map_err(|e| CliError::IoError(e.to_string()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Config show command arguments
#[derive(Debug, Clone)]
pub struct ConfigShowArgs {
    /// Workspace path
    pub workspace: PathBuf,
}

/// Print the effective configuration, with file values and environment
/// overrides applied.
pub fn handle_config_show(args: &ConfigShowArgs) -> Result<(), CliError> {
    let config = ComparisonConfig::load(&args.workspace)?;
    print!("{}", config.to_toml()?);
    Ok(())
}
