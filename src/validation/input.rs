//! Input validation utilities.
//!
//! Validates user-supplied identifiers before they reach key formation, the
//! expression compiler, or the result store. Canonical column names double as
//! SQL column references in stored output, so the rules here are strict.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for canonical column names
pub const MAX_COLUMN_NAME_LENGTH: usize = 255;

/// Maximum length for dataset locations (paths or glob patterns)
pub const MAX_LOCATION_LENGTH: usize = 4096;

/// Prefix reserved for engine sentinels such as the record-status field
pub const RESERVED_PREFIX: &str = "__";

/// Errors that can occur during input validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),

    /// Input collides with a reserved name
    #[error("{field} cannot use the reserved prefix {RESERVED_PREFIX}: {word}")]
    ReservedWord { field: &'static str, word: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a canonical column name.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 255 characters
/// - Must start with a letter or underscore
/// - May contain letters, digits, and underscores
/// - Must not start with `__` (reserved for engine sentinels)
///
/// # Examples
///
/// ```
/// use data_comparison_sdk::validation::input::validate_column_name;
///
/// assert!(validate_column_name("wage_amount").is_ok());
/// assert!(validate_column_name("_internal").is_ok());
/// assert!(validate_column_name("").is_err());
/// assert!(validate_column_name("1st_column").is_err());
/// assert!(validate_column_name("__RECORD_STATUS__").is_err());
/// ```
pub fn validate_column_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty("column name"));
    }

    if name.len() > MAX_COLUMN_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "column name",
            max: MAX_COLUMN_NAME_LENGTH,
            actual: name.len(),
        });
    }

    if name.starts_with(RESERVED_PREFIX) {
        return Err(ValidationError::ReservedWord {
            field: "column name",
            word: name.to_string(),
        });
    }

    // Must start with a letter or underscore
    let first_char = name.chars().next().unwrap();
    if !first_char.is_alphabetic() && first_char != '_' {
        return Err(ValidationError::InvalidFormat(
            "column name",
            "must start with a letter or underscore".to_string(),
        ));
    }

    // May contain letters, digits, and underscores
    for c in name.chars() {
        if !c.is_alphanumeric() && c != '_' {
            return Err(ValidationError::InvalidCharacters {
                field: "column name",
                reason: format!("invalid character: '{}'", c),
            });
        }
    }

    Ok(())
}

/// Validate a dataset location (file path or glob pattern).
///
/// # Examples
///
/// ```
/// use data_comparison_sdk::validation::input::validate_location;
///
/// assert!(validate_location("extracts/source_2024.tsv").is_ok());
/// assert!(validate_location("extracts/part-*.csv").is_ok());
/// assert!(validate_location("").is_err());
/// assert!(validate_location("   ").is_err());
/// ```
pub fn validate_location(location: &str) -> ValidationResult<()> {
    if location.trim().is_empty() {
        return Err(ValidationError::Empty("dataset location"));
    }

    if location.len() > MAX_LOCATION_LENGTH {
        return Err(ValidationError::TooLong {
            field: "dataset location",
            max: MAX_LOCATION_LENGTH,
            actual: location.len(),
        });
    }

    Ok(())
}
