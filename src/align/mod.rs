//! Hash-partitioned alignment of two canonical record sets
//!
//! Records are bucketed by comparison key so that only one bucket pair is
//! resident at a time; within a bucket a hash join produces one
//! [`AlignedEntry`] per distinct key. Bucket assignment is stable across runs
//! for the same key.

use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::models::{AlignedEntry, CanonicalRecord, ComparisonKey, DuplicateKeyPolicy};

/// Default number of key buckets per side.
pub const DEFAULT_PARTITION_COUNT: usize = 16;

/// Fatal alignment failures.
#[derive(Debug, Clone, Error)]
pub enum AlignmentError {
    /// Two records carried the same key under the `fail` duplicate policy
    #[error("duplicate comparison key {key:?} on the {side} side")]
    DuplicateKey { key: String, side: &'static str },
}

/// Result type for alignment operations.
pub type AlignmentResult<T> = Result<T, AlignmentError>;

/// One aligned bucket pair, plus the duplicate rows collapsed building it.
#[derive(Debug, Default)]
pub struct AlignedPartition {
    pub entries: Vec<AlignedEntry>,
    pub source_duplicates_collapsed: u64,
    pub target_duplicates_collapsed: u64,
}

/// Bucket index for a key. Stable across runs and processes.
pub fn partition_index(key: &ComparisonKey, partition_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.as_str().hash(&mut hasher);
    (hasher.finish() % partition_count.max(1) as u64) as usize
}

/// Split records into `partition_count` buckets by key hash.
pub fn partition_records(
    records: Vec<CanonicalRecord>,
    partition_count: usize,
) -> Vec<Vec<CanonicalRecord>> {
    let count = partition_count.max(1);
    let mut partitions: Vec<Vec<CanonicalRecord>> = (0..count).map(|_| Vec::new()).collect();
    for record in records {
        let index = partition_index(&record.key, count);
        partitions[index].push(record);
    }
    partitions
}

/// Join one bucket pair on the comparison key.
///
/// Duplicate keys within a side are resolved by `policy` before the join;
/// `fail` aborts on the first duplicate while the keep policies collapse and
/// count them. Entry order within the partition is unspecified.
pub fn align_partition(
    source: Vec<CanonicalRecord>,
    target: Vec<CanonicalRecord>,
    policy: DuplicateKeyPolicy,
) -> AlignmentResult<AlignedPartition> {
    let (source_by_key, source_collapsed) = collapse(source, policy, "source")?;
    let (mut target_by_key, target_collapsed) = collapse(target, policy, "target")?;

    let mut entries = Vec::with_capacity(source_by_key.len().max(target_by_key.len()));
    for (key, source_record) in source_by_key {
        match target_by_key.remove(&key) {
            Some(target_record) => {
                entries.push(AlignedEntry::Matched(source_record, target_record));
            }
            None => entries.push(AlignedEntry::SourceOnly(source_record)),
        }
    }
    entries.extend(target_by_key.into_values().map(AlignedEntry::TargetOnly));

    Ok(AlignedPartition {
        entries,
        source_duplicates_collapsed: source_collapsed,
        target_duplicates_collapsed: target_collapsed,
    })
}

fn collapse(
    records: Vec<CanonicalRecord>,
    policy: DuplicateKeyPolicy,
    side: &'static str,
) -> AlignmentResult<(HashMap<String, CanonicalRecord>, u64)> {
    let mut by_key: HashMap<String, CanonicalRecord> = HashMap::with_capacity(records.len());
    let mut collapsed = 0u64;

    for record in records {
        match by_key.entry(record.key.as_str().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => match policy {
                DuplicateKeyPolicy::Fail => {
                    return Err(AlignmentError::DuplicateKey {
                        key: record.key.as_str().to_string(),
                        side,
                    });
                }
                DuplicateKeyPolicy::KeepFirst => collapsed += 1,
                DuplicateKeyPolicy::KeepLast => {
                    slot.insert(record);
                    collapsed += 1;
                }
            },
        }
    }

    Ok((by_key, collapsed))
}
