//! Difference records, the long-format output rows
//!
//! One row per individual field difference or missing-record event. The field
//! names and `difference_type` values here are a stability contract consumed
//! by downstream loads and reporting; changes require a bump of
//! [`crate::store::schema::SCHEMA_VERSION`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a single difference row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifferenceType {
    /// Both sides hold the key but a value column differs
    ValueMismatch,
    /// Key present in the target only
    MissingInSource,
    /// Key present in the source only
    MissingInTarget,
}

impl DifferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceType::ValueMismatch => "VALUE_MISMATCH",
            DifferenceType::MissingInSource => "MISSING_IN_SOURCE",
            DifferenceType::MissingInTarget => "MISSING_IN_TARGET",
        }
    }
}

impl std::fmt::Display for DifferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DifferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VALUE_MISMATCH" => Ok(DifferenceType::ValueMismatch),
            "MISSING_IN_SOURCE" => Ok(DifferenceType::MissingInSource),
            "MISSING_IN_TARGET" => Ok(DifferenceType::MissingInTarget),
            _ => Err(format!(
                "Unknown difference type: {} (expected VALUE_MISMATCH, MISSING_IN_SOURCE or MISSING_IN_TARGET)",
                s
            )),
        }
    }
}

/// One normalized difference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceRecord {
    /// Job that produced this row
    pub job_id: Uuid,
    /// Key of the aligned entry this row traces to
    pub comparison_key: String,
    /// Raw key representation from the source side, when present
    pub record_id_a: Option<String>,
    /// Raw key representation from the target side, when present
    pub record_id_b: Option<String>,
    /// Canonical value column name, or the record-status sentinel
    pub field_name: String,
    /// Source-side value, canonical string or presence sentinel
    pub source_value: String,
    /// Target-side value, canonical string or presence sentinel
    pub target_value: String,
    /// Difference classification
    pub difference_type: DifferenceType,
    /// Classification time; identical for every row of one key
    pub report_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference_type_wire_strings() {
        assert_eq!(DifferenceType::ValueMismatch.as_str(), "VALUE_MISMATCH");
        assert_eq!(
            "missing_in_source".parse::<DifferenceType>().unwrap(),
            DifferenceType::MissingInSource
        );
        assert!("MATCH".parse::<DifferenceType>().is_err());
    }

    #[test]
    fn test_serde_uses_contract_names() {
        let json = serde_json::to_string(&DifferenceType::MissingInTarget).unwrap();
        assert_eq!(json, "\"MISSING_IN_TARGET\"");
    }
}
