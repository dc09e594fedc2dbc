//! Key and value normalization
//!
//! Turns raw delimited rows into canonical records: raw columns are renamed
//! per the descriptor's column map, declared type overrides are applied,
//! derived columns are evaluated, and the comparison key is formed from the
//! coerced key values. Records that cannot be normalized are skipped and
//! counted, never fatal.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use data_comparison_sdk::models::{DatasetDescriptor, DeclaredType};
//! use data_comparison_sdk::normalize::{Normalizer, reader::RawTable};
//!
//! let mut descriptor = DatasetDescriptor::new("extract.tsv");
//! descriptor.column_map = HashMap::from([
//!     ("EMP_ID".to_string(), "employee_id".to_string()),
//!     ("AMT".to_string(), "amount".to_string()),
//! ]);
//! descriptor.key_columns = vec!["employee_id".to_string()];
//! descriptor.value_columns = vec!["amount".to_string()];
//! descriptor.type_overrides.insert("amount".to_string(), DeclaredType::Float);
//!
//! let normalizer = Normalizer::new(&descriptor, "source").unwrap();
//! let table = RawTable {
//!     headers: vec!["EMP_ID".to_string(), "AMT".to_string()],
//!     rows: vec![vec!["E1".to_string(), "1,250.00".to_string()]],
//! };
//! let side = normalizer.normalize_table(&table);
//! assert_eq!(side.records.len(), 1);
//! assert_eq!(side.records[0].key.as_str(), "E1");
//! ```

pub mod expression;
pub mod reader;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use expression::{CompiledExpression, ExpressionError};
pub use reader::{RawTable, ReadError, ReadResult, read_table, resolve_files};

use crate::models::record::KEY_SEPARATOR;
use crate::models::{
    CanonicalRecord, ComparisonKey, DatasetDescriptor, DeclaredType, ScalarValue,
};
use crate::validation::{ConfigurationResult, validate_descriptor};

/// Skip details retained per side for reporting.
pub const MAX_SKIP_SAMPLES: usize = 100;

static FORMATTED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9][0-9,]*(\.[0-9]+)?-?$").expect("Invalid regex"));

/// Per-record normalization failures. Never fatal: the record is excluded
/// from alignment and counted in the side's `rows_skipped`.
#[derive(Debug, Clone, Error)]
pub enum NormalizationError {
    /// A declared key or value column is not present in the input
    #[error("required column {column:?} is missing from the input")]
    MissingRequiredColumn { column: String },

    /// A value failed its declared type override
    #[error("cannot coerce {value:?} in column {column:?} to {declared}")]
    TypeCoercionFailure {
        column: String,
        value: String,
        declared: DeclaredType,
    },

    /// A derived-column expression failed on this record's values
    #[error("derived column {column:?}: {source}")]
    Derived {
        column: String,
        source: ExpressionError,
    },
}

/// Result type for normalization operations.
pub type NormalizationResult<T> = Result<T, NormalizationError>;

/// Read/skip counters for one normalized side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SideStats {
    /// Data rows read from the input files
    pub rows_read: u64,
    /// Rows excluded by normalization failures
    pub rows_skipped: u64,
    /// First skip details, capped at [`MAX_SKIP_SAMPLES`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_samples: Vec<String>,
}

impl SideStats {
    /// Record a skipped row, keeping at most [`MAX_SKIP_SAMPLES`] details.
    pub fn add_skip(&mut self, line: u64, error: &NormalizationError) {
        self.rows_skipped += 1;
        if self.skip_samples.len() < MAX_SKIP_SAMPLES {
            self.skip_samples.push(format!("line {}: {}", line, error));
        }
    }
}

/// One side after normalization.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSide {
    pub records: Vec<CanonicalRecord>,
    pub stats: SideStats,
}

/// Normalizer for one dataset descriptor.
///
/// Construction validates the descriptor and compiles its derived-column
/// expressions; a constructed normalizer can only fail per record.
#[derive(Debug)]
pub struct Normalizer {
    column_map: HashMap<String, String>,
    key_columns: Vec<String>,
    value_columns: Vec<String>,
    type_overrides: HashMap<String, DeclaredType>,
    derived: Vec<(String, CompiledExpression)>,
}

impl Normalizer {
    /// Build a normalizer, validating the descriptor first. `side` labels
    /// validation errors as `"source"` or `"target"`.
    pub fn new(descriptor: &DatasetDescriptor, side: &'static str) -> ConfigurationResult<Self> {
        validate_descriptor(descriptor, side)?;

        let mut known: std::collections::HashSet<String> =
            descriptor.column_map.values().cloned().collect();
        let mut derived = Vec::with_capacity(descriptor.derived_columns.len());
        for column in &descriptor.derived_columns {
            // Cannot fail after validate_descriptor, but the compiler does
            // not know that
            let compiled = CompiledExpression::parse(&column.expression, &known).map_err(
                |source| crate::validation::ConfigurationError::Expression {
                    side,
                    column: column.name.clone(),
                    source,
                },
            )?;
            known.insert(column.name.clone());
            derived.push((column.name.clone(), compiled));
        }

        Ok(Normalizer {
            column_map: descriptor.column_map.clone(),
            key_columns: descriptor.key_columns.clone(),
            value_columns: descriptor.value_columns.clone(),
            type_overrides: descriptor.type_overrides.clone(),
            derived,
        })
    }

    /// Normalize a whole raw table, skipping and counting failed rows.
    pub fn normalize_table(&self, table: &RawTable) -> NormalizedSide {
        let bound = self.bind(&table.headers);
        let mut side = NormalizedSide {
            records: Vec::with_capacity(table.rows.len()),
            stats: SideStats::default(),
        };

        for (index, row) in table.rows.iter().enumerate() {
            side.stats.rows_read += 1;
            match bound.normalize_row(row) {
                Ok(record) => side.records.push(record),
                Err(error) => {
                    let line = index as u64 + 2;
                    side.stats.add_skip(line, &error);
                }
            }
        }

        if side.stats.rows_skipped > 0 {
            warn!(
                skipped = side.stats.rows_skipped,
                read = side.stats.rows_read,
                "Rows excluded during normalization"
            );
        }
        side
    }

    /// Bind the normalizer to a concrete header row.
    pub fn bind<'n>(&'n self, headers: &[String]) -> BoundNormalizer<'n> {
        // (raw index, canonical name) for every mapped column in the header
        let mut bindings: Vec<(usize, String)> = Vec::new();
        for (index, raw) in headers.iter().enumerate() {
            if let Some(canonical) = self.column_map.get(raw) {
                bindings.push((index, canonical.clone()));
            }
        }

        let bound_canonical: std::collections::HashSet<&str> =
            bindings.iter().map(|(_, c)| c.as_str()).collect();
        let derived_names: std::collections::HashSet<&str> =
            self.derived.iter().map(|(name, _)| name.as_str()).collect();

        let missing_required = self
            .key_columns
            .iter()
            .chain(self.value_columns.iter())
            .find(|column| {
                !bound_canonical.contains(column.as_str())
                    && !derived_names.contains(column.as_str())
            })
            .cloned();

        // Raw index backing each key column, for the record id
        let key_raw_indexes: Vec<Option<usize>> = self
            .key_columns
            .iter()
            .map(|key| {
                bindings
                    .iter()
                    .find(|(_, canonical)| canonical == key)
                    .map(|(index, _)| *index)
            })
            .collect();

        BoundNormalizer {
            normalizer: self,
            bindings,
            key_raw_indexes,
            missing_required,
        }
    }
}

/// A normalizer bound to one header row.
#[derive(Debug)]
pub struct BoundNormalizer<'n> {
    normalizer: &'n Normalizer,
    bindings: Vec<(usize, String)>,
    key_raw_indexes: Vec<Option<usize>>,
    missing_required: Option<String>,
}

impl BoundNormalizer<'_> {
    /// Normalize one raw row.
    pub fn normalize_row(&self, row: &[String]) -> NormalizationResult<CanonicalRecord> {
        if let Some(column) = &self.missing_required {
            return Err(NormalizationError::MissingRequiredColumn {
                column: column.clone(),
            });
        }

        let mut values: HashMap<String, ScalarValue> =
            HashMap::with_capacity(self.bindings.len() + self.normalizer.derived.len());
        for (index, canonical) in &self.bindings {
            let raw = row.get(*index).map(String::as_str).unwrap_or("");
            let value = match self.normalizer.type_overrides.get(canonical) {
                Some(declared) => coerce_value(raw, *declared).ok_or_else(|| {
                    NormalizationError::TypeCoercionFailure {
                        column: canonical.clone(),
                        value: raw.to_string(),
                        declared: *declared,
                    }
                })?,
                None => ScalarValue::Text(raw.to_string()),
            };
            values.insert(canonical.clone(), value);
        }

        for (name, expression) in &self.normalizer.derived {
            let value =
                expression
                    .evaluate(&values)
                    .map_err(|source| NormalizationError::Derived {
                        column: name.clone(),
                        source,
                    })?;
            values.insert(name.clone(), value);
        }

        let key_values: Vec<ScalarValue> = self
            .normalizer
            .key_columns
            .iter()
            .map(|column| values.get(column).cloned().unwrap_or(ScalarValue::Null))
            .collect();
        let key = ComparisonKey::from_values(&key_values);

        let record_id = self
            .normalizer
            .key_columns
            .iter()
            .zip(&self.key_raw_indexes)
            .map(|(column, raw_index)| match raw_index {
                Some(index) => row.get(*index).cloned().unwrap_or_default(),
                None => values
                    .get(column)
                    .map(ScalarValue::canonical_string)
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR);

        Ok(CanonicalRecord {
            key,
            record_id,
            values,
        })
    }
}

/// Coerce a raw string to a declared type. Returns `None` when the value
/// cannot represent the type.
///
/// Numeric strings may carry thousands separators (`1,250.00`) and a
/// trailing minus (`450.00-`); both forms occur in ledger-style extracts.
/// Empty and whitespace-only strings coerce to null for every non-text type.
pub fn coerce_value(raw: &str, declared: DeclaredType) -> Option<ScalarValue> {
    if declared == DeclaredType::Text {
        return Some(ScalarValue::Text(raw.to_string()));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(ScalarValue::Null);
    }

    match declared {
        DeclaredType::Text => unreachable!(),
        DeclaredType::Float => parse_formatted_number(trimmed).map(ScalarValue::Float),
        DeclaredType::Integer => {
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(ScalarValue::Integer(i));
            }
            let f = parse_formatted_number(trimmed)?;
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Some(ScalarValue::Integer(f as i64))
            } else {
                None
            }
        }
        DeclaredType::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "1" => Some(ScalarValue::Bool(true)),
            "false" | "0" => Some(ScalarValue::Bool(false)),
            _ => None,
        },
    }
}

fn parse_formatted_number(text: &str) -> Option<f64> {
    if FORMATTED_NUMBER_RE.is_match(text) {
        let mut cleaned: String = text.chars().filter(|c| *c != ',').collect();
        if cleaned.ends_with('-') {
            cleaned.pop();
            cleaned.insert(0, '-');
        }
        cleaned.parse::<f64>().ok()
    } else {
        text.parse::<f64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DerivedColumn;

    fn descriptor() -> DatasetDescriptor {
        let mut d = DatasetDescriptor::new("extract.tsv");
        d.column_map = HashMap::from([
            ("EMP_ID".to_string(), "employee_id".to_string()),
            ("CAT".to_string(), "category".to_string()),
            ("AMT".to_string(), "amount".to_string()),
        ]);
        d.key_columns = vec!["employee_id".to_string(), "category".to_string()];
        d.value_columns = vec!["amount".to_string()];
        d.type_overrides
            .insert("amount".to_string(), DeclaredType::Float);
        d
    }

    fn table(rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: vec!["EMP_ID".to_string(), "CAT".to_string(), "AMT".to_string()],
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_coerce_formatted_numbers() {
        assert_eq!(
            coerce_value("1,250.75", DeclaredType::Float),
            Some(ScalarValue::Float(1250.75))
        );
        assert_eq!(
            coerce_value("450.00-", DeclaredType::Float),
            Some(ScalarValue::Float(-450.0))
        );
        assert_eq!(
            coerce_value(" 42 ", DeclaredType::Integer),
            Some(ScalarValue::Integer(42))
        );
        assert_eq!(
            coerce_value("7.0", DeclaredType::Integer),
            Some(ScalarValue::Integer(7))
        );
        assert_eq!(
            coerce_value("", DeclaredType::Float),
            Some(ScalarValue::Null)
        );
        assert_eq!(coerce_value("abc", DeclaredType::Float), None);
        assert_eq!(coerce_value("7.5", DeclaredType::Integer), None);
        assert_eq!(
            coerce_value("TRUE", DeclaredType::Boolean),
            Some(ScalarValue::Bool(true))
        );
        assert_eq!(coerce_value("maybe", DeclaredType::Boolean), None);
    }

    #[test]
    fn test_normalize_renames_and_coerces() {
        let normalizer = Normalizer::new(&descriptor(), "source").unwrap();
        let side = normalizer.normalize_table(&table(&[&["E1", "BASE", "1,000.50"]]));

        assert_eq!(side.stats.rows_read, 1);
        assert_eq!(side.stats.rows_skipped, 0);
        let record = &side.records[0];
        assert_eq!(record.key.as_str(), "E1||BASE");
        assert_eq!(record.record_id, "E1||BASE");
        assert_eq!(record.value("amount"), &ScalarValue::Float(1000.5));
        assert_eq!(
            record.value("employee_id"),
            &ScalarValue::Text("E1".to_string())
        );
    }

    #[test]
    fn test_coercion_failure_skips_and_counts() {
        let normalizer = Normalizer::new(&descriptor(), "source").unwrap();
        let side =
            normalizer.normalize_table(&table(&[&["E1", "BASE", "not-a-number"], &[
                "E2", "BASE", "5",
            ]]));

        assert_eq!(side.stats.rows_read, 2);
        assert_eq!(side.stats.rows_skipped, 1);
        assert_eq!(side.records.len(), 1);
        assert_eq!(side.records[0].key.as_str(), "E2||BASE");
        assert!(side.stats.skip_samples[0].contains("line 2"));
        assert!(side.stats.skip_samples[0].contains("amount"));
    }

    #[test]
    fn test_missing_required_column_skips_every_row() {
        let normalizer = Normalizer::new(&descriptor(), "source").unwrap();
        let headerless = RawTable {
            headers: vec!["EMP_ID".to_string(), "CAT".to_string()],
            rows: vec![
                vec!["E1".to_string(), "BASE".to_string()],
                vec!["E2".to_string(), "BASE".to_string()],
            ],
        };
        let side = normalizer.normalize_table(&headerless);

        assert_eq!(side.stats.rows_skipped, 2);
        assert!(side.records.is_empty());
        assert!(side.stats.skip_samples[0].contains("amount"));
    }

    #[test]
    fn test_unmapped_columns_are_dropped() {
        let normalizer = Normalizer::new(&descriptor(), "source").unwrap();
        let extra = RawTable {
            headers: vec![
                "EMP_ID".to_string(),
                "CAT".to_string(),
                "AMT".to_string(),
                "IGNORED".to_string(),
            ],
            rows: vec![vec![
                "E1".to_string(),
                "BASE".to_string(),
                "1".to_string(),
                "junk".to_string(),
            ]],
        };
        let side = normalizer.normalize_table(&extra);

        assert_eq!(side.records.len(), 1);
        assert!(!side.records[0].values.contains_key("IGNORED"));
        assert!(!side.records[0].values.contains_key("ignored"));
    }

    #[test]
    fn test_key_coercion_reconciles_surface_forms() {
        // "007" in one extract and "7" in another must join once the key is
        // declared numeric
        let mut d = descriptor();
        d.type_overrides
            .insert("employee_id".to_string(), DeclaredType::Integer);
        let normalizer = Normalizer::new(&d, "source").unwrap();

        let side = normalizer.normalize_table(&table(&[&["007", "BASE", "1"]]));
        assert_eq!(side.records[0].key.as_str(), "7||BASE");
        assert_eq!(side.records[0].record_id, "007||BASE");
    }

    #[test]
    fn test_derived_column_feeds_key() {
        let mut d = descriptor();
        d.derived_columns.push(DerivedColumn {
            name: "compound".to_string(),
            expression: "employee_id || '-' || category".to_string(),
        });
        d.key_columns = vec!["compound".to_string()];
        let normalizer = Normalizer::new(&d, "source").unwrap();

        let side = normalizer.normalize_table(&table(&[&["E1", "BASE", "1"]]));
        assert_eq!(side.records[0].key.as_str(), "E1-BASE");
        // Derived keys have no raw backing; the record id falls back to the
        // canonical value
        assert_eq!(side.records[0].record_id, "E1-BASE");
    }

    #[test]
    fn test_skip_samples_are_capped() {
        let normalizer = Normalizer::new(&descriptor(), "source").unwrap();
        let rows: Vec<Vec<String>> = (0..150)
            .map(|i| vec![format!("E{}", i), "BASE".to_string(), "bad".to_string()])
            .collect();
        let big = RawTable {
            headers: vec!["EMP_ID".to_string(), "CAT".to_string(), "AMT".to_string()],
            rows,
        };
        let side = normalizer.normalize_table(&big);

        assert_eq!(side.stats.rows_skipped, 150);
        assert_eq!(side.stats.skip_samples.len(), MAX_SKIP_SAMPLES);
    }
}
