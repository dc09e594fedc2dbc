//! DuckDB result store implementation
//!
//! One database file per job under the results directory. Handles to open
//! databases are kept in a registry so the engine's writer and any concurrent
//! readers of the same job share a single connection; different jobs never
//! share anything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use super::query::{JobSummary, QueryOptions, QueryPage};
use super::schema::{ResultSchema, SCHEMA_VERSION, differences_sql};
use super::{ResultStore, StoreError, StoreResult};
use crate::models::DifferenceRecord;

/// Formatting applied to timestamps bound into the store. Values are written
/// as naive UTC and cast server-side, keeping microsecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

type SharedConnection = Arc<Mutex<duckdb::Connection>>;

/// Embedded result store writing one DuckDB file per job.
pub struct DuckDBResultStore {
    results_dir: PathBuf,
    connections: Mutex<HashMap<Uuid, SharedConnection>>,
}

impl DuckDBResultStore {
    /// Create a store rooted at `results_dir`, creating the directory if
    /// needed.
    pub fn new(results_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = results_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::IoError(format!("Failed to create {}: {}", dir.display(), e)))?;

        Ok(Self {
            results_dir: dir,
            connections: Mutex::new(HashMap::new()),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn db_path(&self, job_id: Uuid) -> PathBuf {
        self.results_dir.join(format!("{}.duckdb", job_id))
    }

    /// Fetch the job's shared connection, opening the database when needed.
    /// With `create` unset, a missing file is [`StoreError::JobNotFound`].
    fn open_or_get(&self, job_id: Uuid, create: bool) -> StoreResult<SharedConnection> {
        let mut connections = self
            .connections
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;

        if let Some(existing) = connections.get(&job_id) {
            return Ok(Arc::clone(existing));
        }

        let path = self.db_path(job_id);
        if !create && !path.exists() {
            return Err(StoreError::JobNotFound(job_id));
        }

        let connection = duckdb::Connection::open(&path).map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let shared = Arc::new(Mutex::new(connection));
        connections.insert(job_id, Arc::clone(&shared));
        Ok(shared)
    }

    fn drop_handle(&self, job_id: Uuid) -> StoreResult<Option<SharedConnection>> {
        let mut connections = self
            .connections
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;
        Ok(connections.remove(&job_id))
    }

    fn insert_all(conn: &duckdb::Connection, records: &[DifferenceRecord]) -> StoreResult<()> {
        let mut stmt = conn
            .prepare(differences_sql::INSERT)
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;

        for record in records {
            stmt.execute(duckdb::params![
                record.job_id.to_string(),
                &record.comparison_key,
                record.record_id_a.as_deref(),
                record.record_id_b.as_deref(),
                &record.field_name,
                &record.source_value,
                &record.target_value,
                record.difference_type.as_str(),
                record
                    .report_timestamp
                    .naive_utc()
                    .format(TIMESTAMP_FORMAT)
                    .to_string(),
            ])
            .map_err(|e| StoreError::QueryFailed(format!("Insert failed: {}", e)))?;
        }
        Ok(())
    }

    fn row_to_record(row: &duckdb::Row) -> StoreResult<DifferenceRecord> {
        let fetch = |e: duckdb::Error| StoreError::QueryFailed(format!("Row fetch error: {}", e));

        let job_id: String = row.get(0).map_err(fetch)?;
        let comparison_key: String = row.get(1).map_err(fetch)?;
        let record_id_a: Option<String> = row.get(2).map_err(fetch)?;
        let record_id_b: Option<String> = row.get(3).map_err(fetch)?;
        let field_name: String = row.get(4).map_err(fetch)?;
        let source_value: String = row.get(5).map_err(fetch)?;
        let target_value: String = row.get(6).map_err(fetch)?;
        let difference_type: String = row.get(7).map_err(fetch)?;
        let report_timestamp: String = row.get(8).map_err(fetch)?;

        Ok(DifferenceRecord {
            job_id: Uuid::parse_str(&job_id)
                .map_err(|e| StoreError::QueryFailed(format!("Invalid job id in store: {}", e)))?,
            comparison_key,
            record_id_a,
            record_id_b,
            field_name,
            source_value,
            target_value,
            difference_type: difference_type.parse().map_err(StoreError::QueryFailed)?,
            report_timestamp: NaiveDateTime::parse_from_str(
                &report_timestamp,
                "%Y-%m-%d %H:%M:%S%.f",
            )
            .map_err(|e| StoreError::QueryFailed(format!("Invalid timestamp in store: {}", e)))?
            .and_utc(),
        })
    }

    /// Assemble the WHERE clause and its bound values for the given options.
    fn filters(options: &QueryOptions) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(difference_type) = options.difference_type {
            clauses.push("difference_type = ?");
            params.push(difference_type.as_str().to_string());
        }
        if let Some(field_name) = &options.field_name {
            clauses.push("field_name = ?");
            params.push(field_name.clone());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (where_sql, params)
    }
}

#[async_trait]
impl ResultStore for DuckDBResultStore {
    async fn begin_job(&self, job_id: Uuid) -> StoreResult<()> {
        let handle = self.open_or_get(job_id, true)?;
        let conn = handle
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;

        conn.execute_batch(ResultSchema::create_tables_sql())
            .map_err(|e| StoreError::QueryFailed(format!("Schema creation failed: {}", e)))?;
        conn.execute_batch(ResultSchema::create_indexes_sql())
            .map_err(|e| StoreError::QueryFailed(format!("Index creation failed: {}", e)))?;
        conn.execute("DELETE FROM differences", [])
            .map_err(|e| StoreError::QueryFailed(format!("Failed to clear prior rows: {}", e)))?;

        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?), ('job_id', ?) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            duckdb::params![SCHEMA_VERSION.to_string(), job_id.to_string()],
        )
        .map_err(|e| StoreError::QueryFailed(format!("Failed to record store metadata: {}", e)))?;

        debug!(job_id = %job_id, path = %self.db_path(job_id).display(), "Result database ready");
        Ok(())
    }

    async fn append(&self, job_id: Uuid, records: &[DifferenceRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let handle = self.open_or_get(job_id, false)?;
        let conn = handle
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;

        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| StoreError::QueryFailed(format!("Begin failed: {}", e)))?;
        match Self::insert_all(&conn, records) {
            Ok(()) => conn
                .execute_batch("COMMIT")
                .map_err(|e| StoreError::QueryFailed(format!("Commit failed: {}", e))),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    async fn finish_job(&self, job_id: Uuid) -> StoreResult<()> {
        let removed = self.drop_handle(job_id)?;
        if removed.is_none() && !self.db_path(job_id).exists() {
            return Err(StoreError::JobNotFound(job_id));
        }
        debug!(job_id = %job_id, "Result database writer closed");
        Ok(())
    }

    async fn query(&self, job_id: Uuid, options: &QueryOptions) -> StoreResult<QueryPage> {
        let handle = self.open_or_get(job_id, false)?;
        let conn = handle
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;

        let (where_sql, params) = Self::filters(options);

        let count_sql = format!("SELECT COUNT(*) FROM differences{}", where_sql);
        let total_count: i64 = conn
            .query_row(
                &count_sql,
                duckdb::params_from_iter(params.iter().map(String::as_str)),
                |row| row.get(0),
            )
            .map_err(|e| StoreError::QueryFailed(format!("Count failed: {}", e)))?;

        let page = options.effective_page();
        let page_size = options.effective_page_size();
        let page_sql = format!(
            "SELECT {} FROM differences{} ORDER BY {} LIMIT {} OFFSET {}",
            differences_sql::SELECT_COLUMNS,
            where_sql,
            options.order_by_sql(),
            page_size,
            options.offset(),
        );

        let mut stmt = conn
            .prepare(&page_sql)
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let mut rows = stmt
            .query(duckdb::params_from_iter(params.iter().map(String::as_str)))
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            records.push(Self::row_to_record(row)?);
        }

        Ok(QueryPage::new(records, page, page_size, total_count as u64))
    }

    async fn summary(&self, job_id: Uuid) -> StoreResult<JobSummary> {
        let handle = self.open_or_get(job_id, false)?;
        let conn = handle
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))?;

        let mut summary = JobSummary::default();

        let mut stmt = conn
            .prepare("SELECT difference_type, COUNT(*) FROM differences GROUP BY difference_type")
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            let difference_type: String = row
                .get(0)
                .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?;
            let count = count as u64;
            summary.total_differences += count;
            match difference_type.as_str() {
                "VALUE_MISMATCH" => summary.value_mismatches = count,
                "MISSING_IN_SOURCE" => summary.missing_in_source = count,
                "MISSING_IN_TARGET" => summary.missing_in_target = count,
                other => {
                    return Err(StoreError::QueryFailed(format!(
                        "Unknown difference type in store: {}",
                        other
                    )));
                }
            }
        }
        drop(rows);
        drop(stmt);

        summary.distinct_keys = conn
            .query_row(
                "SELECT COUNT(DISTINCT comparison_key) FROM differences",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| StoreError::QueryFailed(format!("Count failed: {}", e)))?
            as u64;
        summary.distinct_fields = conn
            .query_row(
                "SELECT COUNT(DISTINCT field_name) FROM differences",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| StoreError::QueryFailed(format!("Count failed: {}", e)))?
            as u64;

        let mut stmt = conn
            .prepare(
                "SELECT field_name, COUNT(*) FROM differences \
                 WHERE difference_type = 'VALUE_MISMATCH' GROUP BY field_name",
            )
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            let field: String = row
                .get(0)
                .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?;
            summary.mismatches_by_field.insert(field, count as u64);
        }

        Ok(summary)
    }

    async fn delete_results(&self, job_id: Uuid) -> StoreResult<()> {
        self.drop_handle(job_id)?;

        let path = self.db_path(job_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                StoreError::IoError(format!("Failed to remove {}: {}", path.display(), e))
            })?;
        }
        // DuckDB may leave a write-ahead log beside the database
        let wal = PathBuf::from(format!("{}.wal", path.display()));
        if wal.exists() {
            let _ = std::fs::remove_file(&wal);
        }
        Ok(())
    }

    fn result_location(&self, job_id: Uuid) -> PathBuf {
        self.db_path(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DifferenceType;
    use chrono::Utc;
    use tempfile::TempDir;

    fn difference(
        job_id: Uuid,
        key: &str,
        field: &str,
        difference_type: DifferenceType,
    ) -> DifferenceRecord {
        DifferenceRecord {
            job_id,
            comparison_key: key.to_string(),
            record_id_a: Some(key.to_string()),
            record_id_b: match difference_type {
                DifferenceType::MissingInTarget => None,
                _ => Some(key.to_string()),
            },
            field_name: field.to_string(),
            source_value: "a".to_string(),
            target_value: "b".to_string(),
            difference_type,
            report_timestamp: Utc::now(),
        }
    }

    async fn seeded_store(job_id: Uuid) -> (TempDir, DuckDBResultStore) {
        let dir = TempDir::new().unwrap();
        let store = DuckDBResultStore::new(dir.path()).unwrap();
        store.begin_job(job_id).await.unwrap();

        let records = vec![
            difference(job_id, "K1", "amount", DifferenceType::ValueMismatch),
            difference(job_id, "K1", "status", DifferenceType::ValueMismatch),
            difference(job_id, "K2", "amount", DifferenceType::ValueMismatch),
            difference(job_id, "K3", "__RECORD_STATUS__", DifferenceType::MissingInTarget),
            difference(job_id, "K4", "__RECORD_STATUS__", DifferenceType::MissingInSource),
        ];
        store.append(job_id, &records).await.unwrap();
        store.finish_job(job_id).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_append_and_query_round_trip() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let page = store
            .query(job_id, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.records.len(), 5);

        // Default ordering is key then field
        let keys: Vec<&str> = page
            .records
            .iter()
            .map(|r| r.comparison_key.as_str())
            .collect();
        assert_eq!(keys, vec!["K1", "K1", "K2", "K3", "K4"]);
        assert_eq!(page.records[0].field_name, "amount");
        assert_eq!(page.records[1].field_name, "status");

        let missing = &page.records[3];
        assert_eq!(missing.difference_type, DifferenceType::MissingInTarget);
        assert_eq!(missing.record_id_b, None);
        assert_eq!(missing.job_id, job_id);
    }

    #[tokio::test]
    async fn test_timestamps_keep_microsecond_precision() {
        let job_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let store = DuckDBResultStore::new(dir.path()).unwrap();
        store.begin_job(job_id).await.unwrap();

        let record = difference(job_id, "K1", "amount", DifferenceType::ValueMismatch);
        let written_micros = record.report_timestamp.timestamp_micros();
        store.append(job_id, &[record]).await.unwrap();
        store.finish_job(job_id).await.unwrap();

        let page = store
            .query(job_id, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(
            page.records[0].report_timestamp.timestamp_micros(),
            written_micros
        );
    }

    #[tokio::test]
    async fn test_filters_and_pagination() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let options = QueryOptions {
            difference_type: Some(DifferenceType::ValueMismatch),
            page_size: 2,
            page: 1,
            ..QueryOptions::default()
        };
        let first = store.query(job_id, &options).await.unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.records.len(), 2);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let second = store
            .query(job_id, &QueryOptions { page: 2, ..options })
            .await
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(!second.has_next);
        assert!(second.has_prev);

        let by_field = store
            .query(job_id, &QueryOptions {
                field_name: Some("amount".to_string()),
                ..QueryOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(by_field.total_count, 2);
    }

    #[tokio::test]
    async fn test_sort_specification_is_applied() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let options = QueryOptions {
            sort: Some(crate::store::SortSpec::parse("comparison_key DESC").unwrap()),
            ..QueryOptions::default()
        };
        let page = store.query(job_id, &options).await.unwrap();
        assert_eq!(page.records[0].comparison_key, "K4");
        assert_eq!(page.records.last().unwrap().comparison_key, "K1");
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let summary = store.summary(job_id).await.unwrap();
        assert_eq!(summary.total_differences, 5);
        assert_eq!(summary.value_mismatches, 3);
        assert_eq!(summary.missing_in_source, 1);
        assert_eq!(summary.missing_in_target, 1);
        assert_eq!(summary.distinct_keys, 4);
        assert_eq!(summary.distinct_fields, 3);
        assert_eq!(summary.mismatches_by_field.get("amount"), Some(&2));
        assert_eq!(summary.mismatches_by_field.get("status"), Some(&1));
        assert_eq!(summary.mismatches_by_field.get("__RECORD_STATUS__"), None);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DuckDBResultStore::new(dir.path()).unwrap();

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.query(missing, &QueryOptions::default()).await,
            Err(StoreError::JobNotFound(_))
        ));
        assert!(matches!(
            store.append(missing, &[]).await,
            Ok(())
        ));
        assert!(matches!(
            store.summary(missing).await,
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_results_removes_database() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let path = store.result_location(job_id);
        assert!(path.exists());

        store.delete_results(job_id).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            store.query(job_id, &QueryOptions::default()).await,
            Err(StoreError::JobNotFound(_))
        ));

        // Idempotent
        store.delete_results(job_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_results_survive_handle_reopen() {
        let job_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();

        {
            let store = DuckDBResultStore::new(dir.path()).unwrap();
            store.begin_job(job_id).await.unwrap();
            store
                .append(job_id, &[difference(
                    job_id,
                    "K1",
                    "amount",
                    DifferenceType::ValueMismatch,
                )])
                .await
                .unwrap();
            store.finish_job(job_id).await.unwrap();
        }

        let reopened = DuckDBResultStore::new(dir.path()).unwrap();
        let page = reopened
            .query(job_id, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
    }
}
