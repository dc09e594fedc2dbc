//! Result database schema definitions
//!
//! One database file per job. The `differences` table layout is the output
//! stability contract: downstream loads and reporting select these columns by
//! name, so renames or type changes require a [`SCHEMA_VERSION`] bump.

/// Schema version recorded in `store_meta` of every result database.
pub const SCHEMA_VERSION: i32 = 1;

/// Result database schema helper.
pub struct ResultSchema;

impl ResultSchema {
    /// Get the schema creation SQL.
    pub fn create_tables_sql() -> &'static str {
        r#"
-- Store metadata (schema version, owning job)
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Long-format difference rows, one per field difference or missing record
CREATE TABLE IF NOT EXISTS differences (
    job_id UUID NOT NULL,
    comparison_key TEXT NOT NULL,
    record_id_a TEXT,
    record_id_b TEXT,
    field_name TEXT NOT NULL,
    source_value TEXT NOT NULL,
    target_value TEXT NOT NULL,
    difference_type TEXT NOT NULL,
    report_timestamp TIMESTAMP NOT NULL
);
"#
    }

    /// Get the index creation SQL. The three indexed columns back the query
    /// filters and the default sort order.
    pub fn create_indexes_sql() -> &'static str {
        r#"
CREATE INDEX IF NOT EXISTS idx_differences_comparison_key ON differences(comparison_key);
CREATE INDEX IF NOT EXISTS idx_differences_field_name ON differences(field_name);
CREATE INDEX IF NOT EXISTS idx_differences_difference_type ON differences(difference_type);
"#
    }
}

/// Statement text for the `differences` table.
pub mod differences_sql {
    /// Insert one difference row. The timestamp parameter is bound as a
    /// formatted UTC string and cast server-side.
    pub const INSERT: &str = r#"
INSERT INTO differences (
    job_id, comparison_key, record_id_a, record_id_b, field_name,
    source_value, target_value, difference_type, report_timestamp
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
"#;

    /// Projection used by every read path. The timestamp comes back as text
    /// so row extraction does not depend on driver-side timestamp mapping.
    pub const SELECT_COLUMNS: &str = "job_id, comparison_key, record_id_a, record_id_b, \
         field_name, source_value, target_value, difference_type, \
         CAST(report_timestamp AS VARCHAR) AS report_timestamp";
}
