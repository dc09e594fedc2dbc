//! Query options, sort parsing and result pages

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::models::{DifferenceRecord, DifferenceType};

/// Columns accepted in a sort specification. Matches the `differences` table.
pub const SORTABLE_COLUMNS: &[&str] = &[
    "comparison_key",
    "record_id_a",
    "record_id_b",
    "field_name",
    "source_value",
    "target_value",
    "difference_type",
    "report_timestamp",
];

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One sort level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// Multi-level sort specification.
///
/// Parsed from `"col [DESC][, col ...]"`; every column is checked against
/// [`SORTABLE_COLUMNS`] so the assembled ORDER BY never carries caller text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parse a sort string such as `"field_name, report_timestamp DESC"`.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let mut keys = Vec::new();

        for term in input.split(',') {
            let mut tokens = term.split_whitespace();
            let column = tokens
                .next()
                .ok_or_else(|| StoreError::InvalidSort("empty sort term".to_string()))?
                .to_lowercase();

            if !SORTABLE_COLUMNS.contains(&column.as_str()) {
                return Err(StoreError::InvalidSort(format!(
                    "unknown column {:?} (expected one of: {})",
                    column,
                    SORTABLE_COLUMNS.join(", ")
                )));
            }

            let direction = match tokens.next() {
                None => SortDirection::Asc,
                Some(word) => match word.to_uppercase().as_str() {
                    "ASC" => SortDirection::Asc,
                    "DESC" => SortDirection::Desc,
                    other => {
                        return Err(StoreError::InvalidSort(format!(
                            "unknown direction {:?} (expected ASC or DESC)",
                            other
                        )));
                    }
                },
            };
            if let Some(extra) = tokens.next() {
                return Err(StoreError::InvalidSort(format!(
                    "unexpected token {:?} in sort term {:?}",
                    extra,
                    term.trim()
                )));
            }

            keys.push(SortKey { column, direction });
        }

        if keys.is_empty() {
            return Err(StoreError::InvalidSort(
                "empty sort specification".to_string(),
            ));
        }
        Ok(SortSpec { keys })
    }

    /// Assemble the ORDER BY clause body. `comparison_key, field_name` are
    /// appended as final tie-break levels so pagination is stable.
    pub fn order_by_sql(&self) -> String {
        let mut levels: Vec<String> = self
            .keys
            .iter()
            .map(|key| format!("{} {}", key.column, key.direction.as_sql()))
            .collect();

        for tie_break in ["comparison_key", "field_name"] {
            if !self.keys.iter().any(|key| key.column == tie_break) {
                levels.push(format!("{} ASC", tie_break));
            }
        }
        levels.join(", ")
    }
}

/// Options for one result page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// 1-based page number; zero reads as one
    pub page: usize,
    /// Rows per page; zero reads as [`DEFAULT_PAGE_SIZE`], values above
    /// [`MAX_PAGE_SIZE`] are clamped
    pub page_size: usize,
    pub sort: Option<SortSpec>,
    pub difference_type: Option<DifferenceType>,
    pub field_name: Option<String>,
}

impl QueryOptions {
    pub fn effective_page(&self) -> usize {
        self.page.max(1)
    }

    pub fn effective_page_size(&self) -> usize {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        }
    }

    pub fn offset(&self) -> usize {
        (self.effective_page() - 1) * self.effective_page_size()
    }

    /// ORDER BY body for these options; default ordering is the tie-break
    /// pair alone.
    pub fn order_by_sql(&self) -> String {
        match &self.sort {
            Some(spec) => spec.order_by_sql(),
            None => "comparison_key ASC, field_name ASC".to_string(),
        }
    }
}

/// One page of difference rows plus pagination context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    pub records: Vec<DifferenceRecord>,
    pub page: usize,
    pub page_size: usize,
    /// Rows matching the filters across all pages
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl QueryPage {
    pub fn new(
        records: Vec<DifferenceRecord>,
        page: usize,
        page_size: usize,
        total_count: u64,
    ) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size as u64)
        };
        QueryPage {
            records,
            page,
            page_size,
            total_count,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_prev: page > 1 && total_count > 0,
        }
    }
}

/// Aggregate view of one job's differences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub total_differences: u64,
    pub value_mismatches: u64,
    pub missing_in_source: u64,
    pub missing_in_target: u64,
    /// Distinct comparison keys with at least one difference
    pub distinct_keys: u64,
    /// Distinct field names present, the record-status sentinel included
    pub distinct_fields: u64,
    /// Value mismatch counts per field
    pub mismatches_by_field: BTreeMap<String, u64>,
}
