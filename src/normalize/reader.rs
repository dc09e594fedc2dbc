//! Delimited-file reading
//!
//! Loads one side of a comparison into a raw string table. A location is
//! either a single file path or a glob pattern; all files matched by a
//! pattern must share one header row and are read in sorted path order.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::models::DatasetDescriptor;

/// Errors raised while resolving or reading dataset files.
#[derive(Debug, Error)]
pub enum ReadError {
    /// File could not be opened or read
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    /// Glob pattern did not parse
    #[error("invalid location pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    /// Location resolved to no files
    #[error("no files match location {0:?}")]
    NoFilesMatched(String),

    /// Delimiter is not a single-byte character
    #[error("delimiter {0:?} is not a single ASCII character")]
    Delimiter(char),

    /// A row could not be parsed
    #[error("malformed row in {path} at line {line}: {message}")]
    Malformed {
        path: String,
        line: u64,
        message: String,
    },

    /// A file's header differs from the first file's header
    #[error("files under one location must share a header: {path} differs from {first}")]
    HeaderMismatch { path: String, first: String },
}

/// Result type for reader operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Raw string table read from one location.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Header row, as written in the file
    pub headers: Vec<String>,
    /// Data rows, one `Vec<String>` per line, same arity as `headers`
    pub rows: Vec<Vec<String>>,
}

/// Resolve a location to the list of files it names.
///
/// Locations containing glob metacharacters are expanded and sorted;
/// plain paths pass through untouched.
pub fn resolve_files(location: &str) -> ReadResult<Vec<PathBuf>> {
    if !location.contains(['*', '?', '[']) {
        return Ok(vec![PathBuf::from(location)]);
    }

    let entries = glob::glob(location).map_err(|e| ReadError::Pattern {
        pattern: location.to_string(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ReadError::Io {
            path: e.path().display().to_string(),
            message: e.to_string(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ReadError::NoFilesMatched(location.to_string()));
    }
    Ok(files)
}

/// Read every file named by the descriptor's location into one table.
pub fn read_table(descriptor: &DatasetDescriptor) -> ReadResult<RawTable> {
    let delimiter =
        u8::try_from(descriptor.delimiter).map_err(|_| ReadError::Delimiter(descriptor.delimiter))?;

    let files = resolve_files(&descriptor.location)?;
    let mut table = RawTable::default();
    let mut first_path: Option<PathBuf> = None;

    for path in &files {
        read_file_into(path, delimiter, &mut table, first_path.as_deref())?;
        first_path.get_or_insert_with(|| path.clone());
    }

    debug!(
        location = %descriptor.location,
        files = files.len(),
        rows = table.rows.len(),
        "Read dataset"
    );
    Ok(table)
}

fn read_file_into(
    path: &Path,
    delimiter: u8,
    table: &mut RawTable,
    first_path: Option<&Path>,
) -> ReadResult<()> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| ReadError::Io {
        path: display.clone(),
        message: e.to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReadError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    match first_path {
        None => table.headers = headers,
        Some(first) => {
            if headers != table.headers {
                return Err(ReadError::HeaderMismatch {
                    path: display,
                    first: first.display().to_string(),
                });
            }
        }
    }

    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| ReadError::Malformed {
            path: display.clone(),
            line: index as u64 + 2,
            message: e.to_string(),
        })?;
        table.rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(())
}
