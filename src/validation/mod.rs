//! Submission-time validation
//!
//! Everything here runs before a job exists: a request that fails validation
//! is rejected with a [`ConfigurationError`] and never reaches the engine.
//! Per-record failures during a run are a different class entirely, see
//! [`crate::normalize::NormalizationError`].

pub mod input;

use std::collections::HashSet;

use thiserror::Error;

pub use input::{ValidationError, ValidationResult, validate_column_name, validate_location};

use crate::models::{ComparisonRequest, DatasetDescriptor};
use crate::normalize::expression::{CompiledExpression, ExpressionError};

/// Fatal submission-time configuration errors. Raised before any job is
/// created; never recorded on a job.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// Numeric tolerance was not declared
    #[error("numeric tolerance (epsilon) must be declared explicitly for every job")]
    MissingEpsilon,

    /// Numeric tolerance is unusable
    #[error("epsilon must be finite and >= 0, got {0}")]
    InvalidEpsilon(f64),

    /// Dataset location missing or unusable
    #[error("{side} dataset: {source}")]
    Location {
        side: &'static str,
        source: ValidationError,
    },

    /// Delimiter outside the accepted single-byte range
    #[error("{side} dataset: delimiter {delimiter:?} must be a single ASCII character other than quote or newline")]
    InvalidDelimiter { side: &'static str, delimiter: char },

    /// Only UTF-8 input is supported
    #[error("{side} dataset: unsupported encoding {encoding:?} (only UTF-8 is accepted)")]
    UnsupportedEncoding { side: &'static str, encoding: String },

    /// Column map has no entries
    #[error("{side} dataset: column map cannot be empty")]
    EmptyColumnMap { side: &'static str },

    /// No key columns declared
    #[error("{side} dataset: at least one key column is required")]
    EmptyKeyColumns { side: &'static str },

    /// A canonical column name failed identifier rules
    #[error("{side} dataset: {source}")]
    Identifier {
        side: &'static str,
        source: ValidationError,
    },

    /// Two raw columns map to the same canonical name, or a derived column
    /// shadows an existing one
    #[error("{side} dataset: canonical column {column:?} is declared more than once")]
    DuplicateCanonicalColumn { side: &'static str, column: String },

    /// A declared key, value, or override column is not produced by the
    /// column map or derived columns
    #[error("{side} dataset: {role} column {column:?} is not produced by the column map")]
    UnknownColumn {
        side: &'static str,
        role: &'static str,
        column: String,
    },

    /// A derived-column expression failed parsing or references unknown
    /// columns
    #[error("{side} dataset: derived column {column:?}: {source}")]
    Expression {
        side: &'static str,
        column: String,
        source: ExpressionError,
    },
}

/// Result type for submission-time validation.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Validate a full comparison request.
///
/// Checks the comparison settings and both descriptors; returns the first
/// failure found. Passing this gate means the engine can only fail at
/// runtime, not on its inputs' declared shape.
pub fn validate_request(request: &ComparisonRequest) -> ConfigurationResult<()> {
    match request.compare.epsilon {
        None => return Err(ConfigurationError::MissingEpsilon),
        Some(epsilon) if !epsilon.is_finite() || epsilon < 0.0 => {
            return Err(ConfigurationError::InvalidEpsilon(epsilon));
        }
        Some(_) => {}
    }

    validate_descriptor(&request.source, "source")?;
    validate_descriptor(&request.target, "target")?;
    Ok(())
}

/// Validate one dataset descriptor.
///
/// Type overrides must reference mapped columns; derived columns are computed
/// after coercion and cannot be overridden.
pub fn validate_descriptor(
    descriptor: &DatasetDescriptor,
    side: &'static str,
) -> ConfigurationResult<()> {
    validate_location(&descriptor.location)
        .map_err(|source| ConfigurationError::Location { side, source })?;

    let delimiter = descriptor.delimiter;
    if !delimiter.is_ascii() || delimiter == '\n' || delimiter == '\r' || delimiter == '"' {
        return Err(ConfigurationError::InvalidDelimiter { side, delimiter });
    }

    let encoding_normalized: String = descriptor
        .encoding
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect();
    if encoding_normalized != "utf8" {
        return Err(ConfigurationError::UnsupportedEncoding {
            side,
            encoding: descriptor.encoding.clone(),
        });
    }

    if descriptor.column_map.is_empty() {
        return Err(ConfigurationError::EmptyColumnMap { side });
    }

    let mut mapped: HashSet<String> = HashSet::new();
    for canonical in descriptor.column_map.values() {
        validate_column_name(canonical)
            .map_err(|source| ConfigurationError::Identifier { side, source })?;
        if !mapped.insert(canonical.clone()) {
            return Err(ConfigurationError::DuplicateCanonicalColumn {
                side,
                column: canonical.clone(),
            });
        }
    }

    // Derived columns see mapped columns plus earlier derived columns
    let mut known = mapped.clone();
    for derived in &descriptor.derived_columns {
        validate_column_name(&derived.name)
            .map_err(|source| ConfigurationError::Identifier { side, source })?;
        if known.contains(&derived.name) {
            return Err(ConfigurationError::DuplicateCanonicalColumn {
                side,
                column: derived.name.clone(),
            });
        }
        CompiledExpression::parse(&derived.expression, &known).map_err(|source| {
            ConfigurationError::Expression {
                side,
                column: derived.name.clone(),
                source,
            }
        })?;
        known.insert(derived.name.clone());
    }

    if descriptor.key_columns.is_empty() {
        return Err(ConfigurationError::EmptyKeyColumns { side });
    }
    for column in &descriptor.key_columns {
        if !known.contains(column) {
            return Err(ConfigurationError::UnknownColumn {
                side,
                role: "key",
                column: column.clone(),
            });
        }
    }
    for column in &descriptor.value_columns {
        if !known.contains(column) {
            return Err(ConfigurationError::UnknownColumn {
                side,
                role: "value",
                column: column.clone(),
            });
        }
    }
    for column in descriptor.type_overrides.keys() {
        if !mapped.contains(column) {
            return Err(ConfigurationError::UnknownColumn {
                side,
                role: "type override",
                column: column.clone(),
            });
        }
    }

    Ok(())
}
