//! Dataset descriptors
//!
//! A descriptor tells the engine where one side of a comparison lives and how
//! to canonicalize it: which raw columns map to which canonical names, which
//! canonical columns form the comparison key, which carry values to compare,
//! and any type overrides or derived columns to apply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::value::DeclaredType;

fn default_delimiter() -> char {
    '\t'
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// A derived canonical column computed from an expression over other
/// canonical columns. Expressions are validated at submission time against
/// the restricted grammar in [`crate::normalize::expression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    /// Canonical name of the derived column
    pub name: String,
    /// Expression source text, e.g. `upper(region) || '-' || plant_code`
    pub expression: String,
}

/// Immutable description of one side (source or target) of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// File path or glob pattern; all matched files must share one header
    pub location: String,
    /// Field delimiter, one ASCII character
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Character encoding; only UTF-8 variants are accepted
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Raw column name to canonical column name
    pub column_map: HashMap<String, String>,
    /// Canonical key column names, in key order
    pub key_columns: Vec<String>,
    /// Canonical value column names to compare
    #[serde(default)]
    pub value_columns: Vec<String>,
    /// Canonical column name to declared type, applied before key formation
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub type_overrides: HashMap<String, DeclaredType>,
    /// Derived columns, evaluated in declaration order after renaming and
    /// coercion; later entries may reference earlier ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_columns: Vec<DerivedColumn>,
}

impl DatasetDescriptor {
    /// Descriptor for a single delimited file with defaults for everything
    /// but the mapping.
    pub fn new(location: impl Into<String>) -> Self {
        DatasetDescriptor {
            location: location.into(),
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            column_map: HashMap::new(),
            key_columns: Vec::new(),
            value_columns: Vec::new(),
            type_overrides: HashMap::new(),
            derived_columns: Vec::new(),
        }
    }

    /// Canonical column names this descriptor can produce: mapped columns
    /// plus derived columns.
    pub fn produced_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.column_map.values().map(String::as_str).collect();
        columns.extend(self.derived_columns.iter().map(|d| d.name.as_str()));
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_on_deserialize() {
        let yaml = r#"
location: data/source.csv
column_map:
  ID: id
key_columns:
  - id
"#;
        let descriptor: DatasetDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.delimiter, '\t');
        assert_eq!(descriptor.encoding, "utf-8");
        assert!(descriptor.value_columns.is_empty());
        assert!(descriptor.type_overrides.is_empty());
    }

    #[test]
    fn test_produced_columns_include_derived() {
        let mut descriptor = DatasetDescriptor::new("a.csv");
        descriptor
            .column_map
            .insert("RAW".to_string(), "canonical".to_string());
        descriptor.derived_columns.push(DerivedColumn {
            name: "combined".to_string(),
            expression: "canonical || 'x'".to_string(),
        });
        let mut produced = descriptor.produced_columns();
        produced.sort_unstable();
        assert_eq!(produced, vec!["canonical", "combined"]);
    }
}
