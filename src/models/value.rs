//! Typed scalar values and their canonical string forms
//!
//! Every cell of a canonical record is one of these variants. Canonical
//! stringification is type-stable: the same logical value always renders to
//! the same string, independent of how it was written in the input file.

use serde::{Deserialize, Serialize};

/// Rendered form of a null value in keys and difference output.
///
/// Chosen so it cannot collide with real data: declared column values are
/// compared typed, and the token only appears where a side holds no value.
pub const NULL_TOKEN: &str = "__NULL__";

/// A typed scalar held by a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Absent or empty value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// Text value
    Text(String),
}

impl ScalarValue {
    /// Canonical, type-stable string form.
    ///
    /// Integers render without separators, floats via shortest round-trip
    /// formatting, booleans as `true`/`false`, null as [`NULL_TOKEN`].
    pub fn canonical_string(&self) -> String {
        match self {
            ScalarValue::Null => NULL_TOKEN.to_string(),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Integer(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Text(s) => s.clone(),
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Numeric view of the value, if it has one.
    ///
    /// Integers widen to `f64`; text is never implicitly numeric here, that
    /// decision belongs to type coercion.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

/// Declared column type used for coercion before key formation and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Text,
    Integer,
    Float,
    Boolean,
}

impl std::fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclaredType::Text => write!(f, "text"),
            DeclaredType::Integer => write!(f, "integer"),
            DeclaredType::Float => write!(f, "float"),
            DeclaredType::Boolean => write!(f, "boolean"),
        }
    }
}
