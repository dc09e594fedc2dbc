//! Aligned entries, the outcome of joining both sides on the comparison key

use serde::{Deserialize, Serialize};

use super::record::{CanonicalRecord, ComparisonKey};

/// Join outcome for one distinct comparison key.
///
/// Exactly one entry exists per key observed in the union of both sides;
/// duplicate keys within a side are resolved before entries are formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignedEntry {
    /// Key present on both sides
    Matched(CanonicalRecord, CanonicalRecord),
    /// Key present only in the source dataset
    SourceOnly(CanonicalRecord),
    /// Key present only in the target dataset
    TargetOnly(CanonicalRecord),
}

impl AlignedEntry {
    /// The comparison key this entry was joined on.
    pub fn key(&self) -> &ComparisonKey {
        match self {
            AlignedEntry::Matched(source, _) => &source.key,
            AlignedEntry::SourceOnly(source) => &source.key,
            AlignedEntry::TargetOnly(target) => &target.key,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, AlignedEntry::Matched(_, _))
    }
}
