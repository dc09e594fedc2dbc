//! CLI support for the data comparison binary
//!
//! Command handlers live in [`commands`]; the binary entry point is
//! `src/cli/main.rs`.

pub mod commands;
pub mod error;

pub use error::CliError;
