//! Canonical records and comparison keys

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::value::ScalarValue;

/// Separator between stringified key parts. Key values are not expected to
/// contain it; when they do, [`ComparisonKey::split`] is lossy but the join
/// itself stays sound because both sides format keys identically.
pub const KEY_SEPARATOR: &str = "||";

/// Deterministic string identifying one logical entity across both datasets.
///
/// Formed by joining the canonical string forms of the key-column values in
/// declared key order. Equal normalized key tuples always produce equal keys;
/// type coercion happens before formation, never after.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonKey(String);

impl ComparisonKey {
    /// Build a key from key-column values in declared order.
    pub fn from_values(values: &[ScalarValue]) -> Self {
        let parts: Vec<String> = values.iter().map(ScalarValue::canonical_string).collect();
        ComparisonKey(parts.join(KEY_SEPARATOR))
    }

    /// Build a key from already-stringified parts.
    pub fn from_parts(parts: &[String]) -> Self {
        ComparisonKey(parts.join(KEY_SEPARATOR))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the key parts. Exact inverse of formation whenever no part
    /// contains [`KEY_SEPARATOR`].
    pub fn split(&self) -> Vec<&str> {
        self.0.split(KEY_SEPARATOR).collect()
    }
}

impl std::fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ComparisonKey {
    fn from(s: String) -> Self {
        ComparisonKey(s)
    }
}

/// A record after renaming, coercion and derived-column evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Comparison key computed from the coerced key-column values
    pub key: ComparisonKey,
    /// Raw, pre-canonicalization key representation from the input file,
    /// kept for traceability in difference output
    pub record_id: String,
    /// Canonical column name to typed value
    pub values: HashMap<String, ScalarValue>,
}

impl CanonicalRecord {
    /// Value of a canonical column; absent columns read as `Null`.
    pub fn value(&self, column: &str) -> &ScalarValue {
        self.values.get(column).unwrap_or(&ScalarValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::NULL_TOKEN;

    #[test]
    fn test_key_round_trip() {
        let values = vec![
            ScalarValue::Text("EMP01".to_string()),
            ScalarValue::Integer(2024),
            ScalarValue::Null,
        ];
        let key = ComparisonKey::from_values(&values);
        assert_eq!(key.as_str(), format!("EMP01||2024||{}", NULL_TOKEN));
        assert_eq!(key.split(), vec!["EMP01", "2024", NULL_TOKEN]);
    }

    #[test]
    fn test_equal_coerced_values_make_equal_keys() {
        // "7" coerced to an integer and a literal 7 must collide
        let a = ComparisonKey::from_values(&[ScalarValue::Integer(7)]);
        let b = ComparisonKey::from_values(&[ScalarValue::Float(7.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_column_reads_null() {
        let record = CanonicalRecord {
            key: ComparisonKey::from_parts(&["k".to_string()]),
            record_id: "k".to_string(),
            values: HashMap::new(),
        };
        assert!(record.value("anything").is_null());
    }
}
