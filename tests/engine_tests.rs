//! End-to-end comparison runs against the embedded result store.
//!
//! Each test drives the full pipeline: TSV fixtures on disk, normalization,
//! alignment, classification, and a query back out of DuckDB.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use data_comparison_sdk::classify::{MISSING_MARKER, PRESENT_MARKER, RECORD_STATUS_FIELD};
use data_comparison_sdk::engine::{
    CancelToken, ComparisonEngine, NullProgressSink, ProgressSink, ProgressUpdate,
};
use data_comparison_sdk::models::{
    CompareConfig, ComparisonRequest, DatasetDescriptor, DeclaredType, DerivedColumn,
    DifferenceRecord, DifferenceType, KEY_SEPARATOR,
};
use data_comparison_sdk::store::{DuckDBResultStore, QueryOptions, ResultStore};
use tempfile::TempDir;
use uuid::Uuid;

fn write_tsv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Descriptor whose physical headers are already the canonical names.
fn descriptor(location: &Path, keys: &[&str], values: &[&str]) -> DatasetDescriptor {
    let mut descriptor = DatasetDescriptor::new(location.to_string_lossy());
    descriptor.column_map = keys
        .iter()
        .chain(values.iter())
        .map(|column| (column.to_string(), column.to_string()))
        .collect();
    descriptor.key_columns = keys.iter().map(|k| k.to_string()).collect();
    descriptor.value_columns = values.iter().map(|v| v.to_string()).collect();
    descriptor
}

fn request(source: DatasetDescriptor, target: DatasetDescriptor) -> ComparisonRequest {
    ComparisonRequest {
        source,
        target,
        compare: CompareConfig {
            epsilon: Some(0.0),
            ..CompareConfig::default()
        },
        metadata: HashMap::new(),
    }
}

fn engine(dir: &TempDir) -> ComparisonEngine<DuckDBResultStore> {
    let store = DuckDBResultStore::new(dir.path().join("results")).unwrap();
    ComparisonEngine::new(Arc::new(store))
}

async fn run_job(
    engine: &ComparisonEngine<DuckDBResultStore>,
    request: &ComparisonRequest,
) -> (Uuid, Vec<DifferenceRecord>) {
    let job_id = Uuid::new_v4();
    engine
        .run(job_id, request, &NullProgressSink, &CancelToken::new())
        .await
        .unwrap();
    let page = engine
        .store()
        .query(
            job_id,
            &QueryOptions {
                page_size: 1000,
                ..QueryOptions::default()
            },
        )
        .await
        .unwrap();
    (job_id, page.records)
}

/// Sink that keeps every update so tests can inspect the progress stream.
#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressSink for RecordingSink {
    fn update(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

mod value_mismatch_tests {
    use super::*;

    #[tokio::test]
    async fn exact_numeric_text_difference_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(dir.path(), "source.tsv", "id\tamount\nK1\t100.00\n");
        let target = write_tsv(dir.path(), "target.tsv", "id\tamount\nK1\t100.01\n");
        let request = request(
            descriptor(&source, &["id"], &["amount"]),
            descriptor(&target, &["id"], &["amount"]),
        );

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.comparison_key, "K1");
        assert_eq!(record.field_name, "amount");
        assert_eq!(record.source_value, "100.00");
        assert_eq!(record.target_value, "100.01");
        assert_eq!(record.difference_type, DifferenceType::ValueMismatch);
    }

    #[tokio::test]
    async fn epsilon_tolerates_small_numeric_drift() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(dir.path(), "source.tsv", "id\tamount\nK1\t100.00\n");
        let target = write_tsv(dir.path(), "target.tsv", "id\tamount\nK1\t100.01\n");
        let mut source_descriptor = descriptor(&source, &["id"], &["amount"]);
        source_descriptor
            .type_overrides
            .insert("amount".to_string(), DeclaredType::Float);
        let mut target_descriptor = descriptor(&target, &["id"], &["amount"]);
        target_descriptor
            .type_overrides
            .insert("amount".to_string(), DeclaredType::Float);
        let mut request = request(source_descriptor, target_descriptor);
        request.compare.epsilon = Some(0.05);

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn every_differing_field_of_a_key_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(
            dir.path(),
            "source.tsv",
            "id\tamount\tstatus\nK1\t10\topen\n",
        );
        let target = write_tsv(
            dir.path(),
            "target.tsv",
            "id\tamount\tstatus\nK1\t11\tclosed\n",
        );
        let request = request(
            descriptor(&source, &["id"], &["amount", "status"]),
            descriptor(&target, &["id"], &["amount", "status"]),
        );

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 2);
        let fields: Vec<&str> = records.iter().map(|r| r.field_name.as_str()).collect();
        assert!(fields.contains(&"amount"));
        assert!(fields.contains(&"status"));
        assert!(
            records
                .iter()
                .all(|r| r.difference_type == DifferenceType::ValueMismatch)
        );
    }
}

mod singleton_tests {
    use super::*;

    #[tokio::test]
    async fn source_only_key_yields_one_sentinel_row() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(
            dir.path(),
            "source.tsv",
            "id\tamount\nK1\t10\nK2\t20\n",
        );
        let target = write_tsv(dir.path(), "target.tsv", "id\tamount\nK1\t10\n");
        let request = request(
            descriptor(&source, &["id"], &["amount"]),
            descriptor(&target, &["id"], &["amount"]),
        );

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.comparison_key, "K2");
        assert_eq!(record.field_name, RECORD_STATUS_FIELD);
        assert_eq!(record.source_value, PRESENT_MARKER);
        assert_eq!(record.target_value, MISSING_MARKER);
        assert_eq!(record.difference_type, DifferenceType::MissingInTarget);
        assert!(record.record_id_a.is_some());
        assert!(record.record_id_b.is_none());
    }

    #[tokio::test]
    async fn target_only_key_yields_one_sentinel_row() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(dir.path(), "source.tsv", "id\tamount\nK1\t10\n");
        let target = write_tsv(
            dir.path(),
            "target.tsv",
            "id\tamount\nK1\t10\nK9\t90\n",
        );
        let request = request(
            descriptor(&source, &["id"], &["amount"]),
            descriptor(&target, &["id"], &["amount"]),
        );

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.comparison_key, "K9");
        assert_eq!(record.field_name, RECORD_STATUS_FIELD);
        assert_eq!(record.source_value, MISSING_MARKER);
        assert_eq!(record.target_value, PRESENT_MARKER);
        assert_eq!(record.difference_type, DifferenceType::MissingInSource);
        assert!(record.record_id_a.is_none());
        assert!(record.record_id_b.is_some());
    }
}

mod large_run_tests {
    use super::*;

    fn bulk_tsv(rows: usize) -> String {
        let mut out = String::from("id\tamount\n");
        for i in 0..rows {
            out.push_str(&format!("K{:05}\t{}\n", i, i * 3));
        }
        out
    }

    #[tokio::test]
    async fn identical_datasets_complete_with_zero_differences() {
        let dir = TempDir::new().unwrap();
        let contents = bulk_tsv(10_000);
        let source = write_tsv(dir.path(), "source.tsv", &contents);
        let target = write_tsv(dir.path(), "target.tsv", &contents);
        let request = request(
            descriptor(&source, &["id"], &["amount"]),
            descriptor(&target, &["id"], &["amount"]),
        );

        let engine = engine(&dir);
        let job_id = Uuid::new_v4();
        let sink = RecordingSink::default();
        let stats = engine
            .run(job_id, &request, &sink, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(stats.distinct_keys, 10_000);
        assert_eq!(stats.matched_pairs, 10_000);
        assert_eq!(stats.total_differences, 0);

        let page = engine
            .store()
            .query(job_id, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.records.is_empty());

        let updates = sink.updates.into_inner().unwrap();
        for pair in updates.windows(2) {
            assert!(
                pair[1].percent >= pair[0].percent,
                "progress went backwards: {} -> {}",
                pair[0].percent,
                pair[1].percent
            );
        }
        let last = updates.last().unwrap();
        assert_eq!(last.rows_total, Some(10_000));
        assert_eq!(last.rows_processed, 10_000);
        assert!((last.percent - 100.0).abs() < f32::EPSILON);
    }
}

mod determinism_tests {
    use super::*;

    /// Everything but the run-scoped identifiers must match between runs.
    fn stable_view(record: &DifferenceRecord) -> (String, String, String, String, DifferenceType) {
        (
            record.comparison_key.clone(),
            record.field_name.clone(),
            record.source_value.clone(),
            record.target_value.clone(),
            record.difference_type,
        )
    }

    #[tokio::test]
    async fn reruns_produce_identical_differences() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(
            dir.path(),
            "source.tsv",
            "id\tamount\tstatus\nK1\t10\topen\nK2\t20\topen\nK3\t30\topen\n",
        );
        let target = write_tsv(
            dir.path(),
            "target.tsv",
            "id\tamount\tstatus\nK1\t10\tclosed\nK2\t25\topen\nK4\t40\topen\n",
        );
        let request = request(
            descriptor(&source, &["id"], &["amount", "status"]),
            descriptor(&target, &["id"], &["amount", "status"]),
        );

        let engine = engine(&dir);
        let (first_job, first_records) = run_job(&engine, &request).await;
        let (second_job, second_records) = run_job(&engine, &request).await;

        assert_ne!(first_job, second_job);
        assert_eq!(first_records.len(), second_records.len());
        let first: Vec<_> = first_records.iter().map(stable_view).collect();
        let second: Vec<_> = second_records.iter().map(stable_view).collect();
        assert_eq!(first, second);

        for record in &second_records {
            assert_eq!(record.job_id, second_job);
        }
    }
}

mod composite_key_tests {
    use super::*;

    #[tokio::test]
    async fn composite_keys_round_trip_through_the_separator() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(
            dir.path(),
            "source.tsv",
            "region\tplant\tamount\nEU\tP1\t10\nUS\tP2\t20\n",
        );
        let target = write_tsv(
            dir.path(),
            "target.tsv",
            "region\tplant\tamount\nEU\tP1\t11\nUS\tP2\t20\n",
        );
        let request = request(
            descriptor(&source, &["region", "plant"], &["amount"]),
            descriptor(&target, &["region", "plant"], &["amount"]),
        );

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.comparison_key, format!("EU{}P1", KEY_SEPARATOR));
        let parts: Vec<&str> = record.comparison_key.split(KEY_SEPARATOR).collect();
        assert_eq!(parts, vec!["EU", "P1"]);
    }

    #[tokio::test]
    async fn derived_key_column_aligns_both_sides() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(
            dir.path(),
            "source.tsv",
            "region\tplant\tamount\neu\tP1\t10\n",
        );
        let target = write_tsv(
            dir.path(),
            "target.tsv",
            "region\tplant\tamount\nEU\tP1\t12\n",
        );

        let mut source_descriptor = descriptor(&source, &["region", "plant"], &["amount"]);
        source_descriptor.key_columns = vec!["site_key".to_string()];
        source_descriptor.derived_columns = vec![DerivedColumn {
            name: "site_key".to_string(),
            expression: "upper(region) || '-' || plant".to_string(),
        }];
        let mut target_descriptor = descriptor(&target, &["region", "plant"], &["amount"]);
        target_descriptor.key_columns = vec!["site_key".to_string()];
        target_descriptor.derived_columns = vec![DerivedColumn {
            name: "site_key".to_string(),
            expression: "upper(region) || '-' || plant".to_string(),
        }];

        let request = request(source_descriptor, target_descriptor);
        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].comparison_key, "EU-P1");
        assert_eq!(records[0].field_name, "amount");
    }
}

mod normalization_option_tests {
    use super::*;

    #[tokio::test]
    async fn case_and_whitespace_options_suppress_cosmetic_differences() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(dir.path(), "source.tsv", "id\tname\nK1\t  Widget \n");
        let target = write_tsv(dir.path(), "target.tsv", "id\tname\nK1\twidget\n");
        let mut request = request(
            descriptor(&source, &["id"], &["name"]),
            descriptor(&target, &["id"], &["name"]),
        );
        request.compare.ignore_case = true;
        request.compare.trim_strings = true;

        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn column_map_renames_physical_headers() {
        let dir = TempDir::new().unwrap();
        let source = write_tsv(dir.path(), "source.tsv", "ID_NR\tAMT\nK1\t10\n");
        let target = write_tsv(dir.path(), "target.tsv", "id\tamount\nK1\t15\n");

        let mut source_descriptor = descriptor(&source, &["id"], &["amount"]);
        source_descriptor.column_map =
            HashMap::from([("ID_NR".to_string(), "id".to_string()), ("AMT".to_string(), "amount".to_string())]);
        let target_descriptor = descriptor(&target, &["id"], &["amount"]);

        let request = request(source_descriptor, target_descriptor);
        let engine = engine(&dir);
        let (_, records) = run_job(&engine, &request).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field_name, "amount");
        assert_eq!(records[0].source_value, "10");
        assert_eq!(records[0].target_value, "15");
    }
}
