//! Result store behaviour over a larger seeded dataset: pagination math,
//! filters, sort specifications, summaries, and file lifecycle.

use chrono::Utc;
use data_comparison_sdk::models::{DifferenceRecord, DifferenceType};
use data_comparison_sdk::store::{
    DuckDBResultStore, QueryOptions, ResultStore, SortSpec, StoreError,
};
use tempfile::TempDir;
use uuid::Uuid;

fn record(job_id: Uuid, index: usize, field: &str, kind: DifferenceType) -> DifferenceRecord {
    DifferenceRecord {
        job_id,
        comparison_key: format!("K{:04}", index),
        record_id_a: Some(format!("K{:04}", index)),
        record_id_b: Some(format!("K{:04}", index)),
        field_name: field.to_string(),
        source_value: format!("src-{}", index),
        target_value: format!("tgt-{}", index),
        difference_type: kind,
        report_timestamp: Utc::now(),
    }
}

/// 250 rows: 150 amount mismatches, 50 status mismatches, 30 missing in
/// target, 20 missing in source, appended across three batches.
async fn seeded_store(job_id: Uuid) -> (TempDir, DuckDBResultStore) {
    let dir = TempDir::new().unwrap();
    let store = DuckDBResultStore::new(dir.path().join("results")).unwrap();
    store.begin_job(job_id).await.unwrap();

    let mut records = Vec::new();
    for i in 0..150 {
        records.push(record(job_id, i, "amount", DifferenceType::ValueMismatch));
    }
    for i in 150..200 {
        records.push(record(job_id, i, "status", DifferenceType::ValueMismatch));
    }
    for i in 200..230 {
        let mut row = record(job_id, i, "__RECORD_STATUS__", DifferenceType::MissingInTarget);
        row.record_id_b = None;
        records.push(row);
    }
    for i in 230..250 {
        let mut row = record(job_id, i, "__RECORD_STATUS__", DifferenceType::MissingInSource);
        row.record_id_a = None;
        records.push(row);
    }

    for chunk in records.chunks(100) {
        store.append(job_id, chunk).await.unwrap();
    }
    store.finish_job(job_id).await.unwrap();
    (dir, store)
}

mod pagination_tests {
    use super::*;

    #[tokio::test]
    async fn pages_partition_the_result_set() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let first = store
            .query(
                job_id,
                &QueryOptions {
                    page: 1,
                    page_size: 100,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.total_count, 250);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.records.len(), 100);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = store
            .query(
                job_id,
                &QueryOptions {
                    page: 3,
                    page_size: 100,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(last.records.len(), 50);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let beyond = store
            .query(
                job_id,
                &QueryOptions {
                    page: 9,
                    page_size: 100,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(beyond.records.is_empty());
        assert_eq!(beyond.total_count, 250);
    }

    #[tokio::test]
    async fn default_ordering_is_stable_across_pages() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = store
                .query(
                    job_id,
                    &QueryOptions {
                        page,
                        page_size: 100,
                        ..QueryOptions::default()
                    },
                )
                .await
                .unwrap();
            seen.extend(
                result
                    .records
                    .iter()
                    .map(|r| (r.comparison_key.clone(), r.field_name.clone())),
            );
        }

        assert_eq!(seen.len(), 250);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), 250);
    }
}

mod filter_tests {
    use super::*;

    #[tokio::test]
    async fn difference_type_filter_narrows_the_set() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let missing = store
            .query(
                job_id,
                &QueryOptions {
                    page_size: 1000,
                    difference_type: Some(DifferenceType::MissingInTarget),
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(missing.total_count, 30);
        assert!(
            missing
                .records
                .iter()
                .all(|r| r.difference_type == DifferenceType::MissingInTarget)
        );
    }

    #[tokio::test]
    async fn field_and_type_filters_combine() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let status_rows = store
            .query(
                job_id,
                &QueryOptions {
                    page_size: 1000,
                    difference_type: Some(DifferenceType::ValueMismatch),
                    field_name: Some("status".to_string()),
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(status_rows.total_count, 50);
        assert!(status_rows.records.iter().all(|r| r.field_name == "status"));
    }
}

mod sort_tests {
    use super::*;

    #[tokio::test]
    async fn explicit_sort_orders_rows() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let sorted = store
            .query(
                job_id,
                &QueryOptions {
                    page_size: 1000,
                    sort: Some(SortSpec::parse("comparison_key DESC").unwrap()),
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();

        let keys: Vec<&str> = sorted
            .records
            .iter()
            .map(|r| r.comparison_key.as_str())
            .collect();
        assert_eq!(keys.first(), Some(&"K0249"));
        assert_eq!(keys.last(), Some(&"K0000"));
    }

    #[tokio::test]
    async fn multi_level_sort_applies_in_order() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let sorted = store
            .query(
                job_id,
                &QueryOptions {
                    page_size: 1000,
                    sort: Some(SortSpec::parse("field_name, comparison_key DESC").unwrap()),
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();

        let first = &sorted.records[0];
        assert_eq!(first.field_name, "__RECORD_STATUS__");
        assert_eq!(first.comparison_key, "K0249");
    }

    #[test]
    fn unknown_sort_column_is_rejected() {
        let error = SortSpec::parse("job_id DESC").unwrap_err();
        assert!(matches!(error, StoreError::InvalidSort(_)));
        let error = SortSpec::parse("comparison_key SIDEWAYS").unwrap_err();
        assert!(matches!(error, StoreError::InvalidSort(_)));
    }
}

mod summary_tests {
    use super::*;

    #[tokio::test]
    async fn summary_counts_every_category() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let summary = store.summary(job_id).await.unwrap();
        assert_eq!(summary.total_differences, 250);
        assert_eq!(summary.value_mismatches, 200);
        assert_eq!(summary.missing_in_target, 30);
        assert_eq!(summary.missing_in_source, 20);
        assert_eq!(summary.distinct_keys, 250);
        assert_eq!(summary.mismatches_by_field.get("amount"), Some(&150));
        assert_eq!(summary.mismatches_by_field.get("status"), Some(&50));
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn results_are_readable_through_a_second_store_handle() {
        let job_id = Uuid::new_v4();
        let (dir, store) = seeded_store(job_id).await;
        drop(store);

        let reopened = DuckDBResultStore::new(dir.path().join("results")).unwrap();
        let page = reopened
            .query(job_id, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 250);

        let summary = reopened.summary(job_id).await.unwrap();
        assert_eq!(summary.total_differences, 250);
    }

    #[tokio::test]
    async fn delete_results_is_idempotent() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        let path = store.result_location(job_id);
        assert!(path.exists());

        store.delete_results(job_id).await.unwrap();
        assert!(!path.exists());
        store.delete_results(job_id).await.unwrap();

        let error = store.query(job_id, &QueryOptions::default()).await.unwrap_err();
        assert!(matches!(error, StoreError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn begin_job_resets_redundant_runs() {
        let job_id = Uuid::new_v4();
        let (_dir, store) = seeded_store(job_id).await;

        store.begin_job(job_id).await.unwrap();
        store
            .append(job_id, &[record(job_id, 0, "amount", DifferenceType::ValueMismatch)])
            .await
            .unwrap();
        store.finish_job(job_id).await.unwrap();

        let page = store.query(job_id, &QueryOptions::default()).await.unwrap();
        assert_eq!(page.total_count, 1);
    }
}
