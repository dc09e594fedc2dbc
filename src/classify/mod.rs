//! Difference classification
//!
//! Turns aligned entries into long-format [`DifferenceRecord`] rows. Matched
//! entries are compared column by column under the job's comparison rules;
//! one-sided entries become a single missing-record row carrying the
//! [`RECORD_STATUS_FIELD`] sentinel.

use chrono::Utc;
use rayon::prelude::*;
use uuid::Uuid;

use crate::models::{
    AlignedEntry, CompareConfig, DifferenceRecord, DifferenceType, ScalarValue,
};
use crate::validation::ConfigurationError;

/// Sentinel field name for missing-record rows.
pub const RECORD_STATUS_FIELD: &str = "__RECORD_STATUS__";
/// Record-status value for the side that holds the key.
pub const PRESENT_MARKER: &str = "PRESENT";
/// Record-status value for the side that lacks the key.
pub const MISSING_MARKER: &str = "MISSING";

/// Resolved comparison rules for one job.
///
/// Built from a [`CompareConfig`] once the epsilon has been checked; the
/// classifier itself has no defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareRules {
    pub epsilon: f64,
    pub ignore_case: bool,
    pub trim_strings: bool,
}

impl TryFrom<&CompareConfig> for CompareRules {
    type Error = ConfigurationError;

    fn try_from(config: &CompareConfig) -> Result<Self, Self::Error> {
        let epsilon = config.epsilon.ok_or(ConfigurationError::MissingEpsilon)?;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ConfigurationError::InvalidEpsilon(epsilon));
        }
        Ok(CompareRules {
            epsilon,
            ignore_case: config.ignore_case,
            trim_strings: config.trim_strings,
        })
    }
}

/// Type-aware equality between two canonical values.
///
/// Numeric pairs (and int/float mixes) compare within `epsilon`; two NaNs are
/// equal; nulls equal only each other; text follows the trim and case rules;
/// anything cross-type falls back to canonical-string equality.
pub fn values_equal(a: &ScalarValue, b: &ScalarValue, rules: &CompareRules) -> bool {
    match (a, b) {
        (ScalarValue::Null, ScalarValue::Null) => true,
        (ScalarValue::Null, _) | (_, ScalarValue::Null) => false,
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => x == y,
        (ScalarValue::Integer(x), ScalarValue::Integer(y)) => x == y,
        (ScalarValue::Float(x), ScalarValue::Float(y)) => numeric_equal(*x, *y, rules.epsilon),
        (ScalarValue::Integer(x), ScalarValue::Float(y)) => {
            numeric_equal(*x as f64, *y, rules.epsilon)
        }
        (ScalarValue::Float(x), ScalarValue::Integer(y)) => {
            numeric_equal(*x, *y as f64, rules.epsilon)
        }
        (ScalarValue::Text(x), ScalarValue::Text(y)) => text_equal(x, y, rules),
        _ => text_equal(&a.canonical_string(), &b.canonical_string(), rules),
    }
}

fn numeric_equal(x: f64, y: f64, epsilon: f64) -> bool {
    if x.is_nan() && y.is_nan() {
        return true;
    }
    if x.is_nan() || y.is_nan() {
        return false;
    }
    if x == y {
        return true;
    }
    (x - y).abs() <= epsilon
}

fn text_equal(x: &str, y: &str, rules: &CompareRules) -> bool {
    let (x, y) = if rules.trim_strings {
        (x.trim(), y.trim())
    } else {
        (x, y)
    };
    if rules.ignore_case {
        x.to_lowercase() == y.to_lowercase()
    } else {
        x == y
    }
}

/// Classify one aligned entry. Every emitted row shares one timestamp.
pub fn classify_entry(
    job_id: Uuid,
    entry: &AlignedEntry,
    value_columns: &[String],
    rules: &CompareRules,
) -> Vec<DifferenceRecord> {
    let report_timestamp = Utc::now();

    match entry {
        AlignedEntry::SourceOnly(record) => vec![DifferenceRecord {
            job_id,
            comparison_key: record.key.as_str().to_string(),
            record_id_a: Some(record.record_id.clone()),
            record_id_b: None,
            field_name: RECORD_STATUS_FIELD.to_string(),
            source_value: PRESENT_MARKER.to_string(),
            target_value: MISSING_MARKER.to_string(),
            difference_type: DifferenceType::MissingInTarget,
            report_timestamp,
        }],
        AlignedEntry::TargetOnly(record) => vec![DifferenceRecord {
            job_id,
            comparison_key: record.key.as_str().to_string(),
            record_id_a: None,
            record_id_b: Some(record.record_id.clone()),
            field_name: RECORD_STATUS_FIELD.to_string(),
            source_value: MISSING_MARKER.to_string(),
            target_value: PRESENT_MARKER.to_string(),
            difference_type: DifferenceType::MissingInSource,
            report_timestamp,
        }],
        AlignedEntry::Matched(source, target) => {
            let mut differences = Vec::new();
            for column in value_columns {
                let source_value = source.value(column);
                let target_value = target.value(column);
                if !values_equal(source_value, target_value, rules) {
                    differences.push(DifferenceRecord {
                        job_id,
                        comparison_key: source.key.as_str().to_string(),
                        record_id_a: Some(source.record_id.clone()),
                        record_id_b: Some(target.record_id.clone()),
                        field_name: column.clone(),
                        source_value: source_value.canonical_string(),
                        target_value: target_value.canonical_string(),
                        difference_type: DifferenceType::ValueMismatch,
                        report_timestamp,
                    });
                }
            }
            differences
        }
    }
}

/// Classify a whole partition, fanning entries out across the Rayon pool.
pub fn classify_partition(
    job_id: Uuid,
    entries: &[AlignedEntry],
    value_columns: &[String],
    rules: &CompareRules,
) -> Vec<DifferenceRecord> {
    entries
        .par_iter()
        .flat_map_iter(|entry| classify_entry(job_id, entry, value_columns, rules))
        .collect()
}
