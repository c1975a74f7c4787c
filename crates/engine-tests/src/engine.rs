use crate::{
    memory::{MemoryDestination, MemorySource},
    utils::{
        DESTINATION_COLUMNS, customer_mapping, customer_row, customers_destination,
        customers_source, rows_by_id, run_with, settings, table_handle,
    },
};
use connectors::file::csv::{settings::CsvSettings, source::CsvSource};
use engine_processing::error::ProcessingError;
use engine_runtime::{
    error::RuntimeError,
    execution::{
        controller::{RunController, RunProgress, RunStatus},
        plan::SourceHandle,
    },
};
use model::{
    core::value::Value, execution::conflict::ConflictPolicy, records::row::RowData,
    transform::mapping::MappingError,
};
use planner::query::dialect::DatabaseKind;
use std::{io::Write, sync::Arc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn controller() -> RunController {
    RunController::new(CancellationToken::new())
}

fn existing_customer(id: i64) -> RowData {
    RowData::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::String("Existing".into())),
        ("active", Value::Boolean(true)),
        ("balance", Value::Null),
    ])
}

#[tokio::test]
async fn completed_run_copies_every_row() {
    let source = Arc::new(customers_source(25));
    let destination = customers_destination(DatabaseKind::Postgres);

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.batches, 3);
    assert_eq!(report.counters.fetched, 25);
    assert_eq!(report.counters.inserted_or_upserted, 25);
    assert!(report.counters.is_balanced());
    assert!(report.rejected_rows.is_empty());

    let expected: Vec<RowData> = (1..=25).map(customer_row).collect();
    assert_eq!(rows_by_id(&destination), expected);
    assert_eq!(
        source.queries(),
        vec![
            "SELECT \"cust_id\" AS \"id\", \"full_name\" AS \"name\", \"is_active\" AS \"active\", \
             \"balance\" AS \"balance\" FROM \"public\".\"customers\""
                .to_string()
        ]
    );
}

#[tokio::test]
async fn chunk_size_does_not_change_the_outcome() {
    let mut outcomes = Vec::new();
    for chunk_size in [1, 7, 10_000] {
        let source = Arc::new(customers_source(10_000));
        let destination = customers_destination(DatabaseKind::Postgres);
        destination.seed((1..=100).map(|id| customer_row(id * 50)).collect());

        let report = run_with(
            &controller(),
            &table_handle(&source),
            &destination,
            Some(customer_mapping()),
            &settings(chunk_size, ConflictPolicy::SkipDuplicates, true),
        )
        .await
        .unwrap();

        assert_eq!(report.batches, 10_000u64.div_ceil(chunk_size as u64));
        assert!(report.counters.is_balanced());
        outcomes.push((report.counters, rows_by_id(&destination)));
    }

    let (counters, rows) = &outcomes[0];
    assert_eq!(counters.fetched, 10_000);
    assert_eq!(counters.inserted_or_upserted, 9_900);
    assert_eq!(counters.duplicates_skipped, 100);
    assert_eq!(rows.len(), 10_000);
    for (other_counters, other_rows) in &outcomes[1..] {
        assert_eq!(other_counters, counters);
        assert_eq!(other_rows, rows);
    }
}

#[tokio::test]
async fn second_skip_run_only_counts_duplicates() {
    let destination = customers_destination(DatabaseKind::Postgres);
    let run_settings = settings(8, ConflictPolicy::SkipDuplicates, true);

    let first = run_with(
        &controller(),
        &table_handle(&Arc::new(customers_source(30))),
        &destination,
        Some(customer_mapping()),
        &run_settings,
    )
    .await
    .unwrap();
    let after_first = rows_by_id(&destination);

    let second = run_with(
        &controller(),
        &table_handle(&Arc::new(customers_source(30))),
        &destination,
        Some(customer_mapping()),
        &run_settings,
    )
    .await
    .unwrap();

    assert_eq!(first.counters.inserted_or_upserted, 30);
    assert_eq!(second.counters.fetched, 30);
    assert_eq!(second.counters.duplicates_skipped, 30);
    assert_eq!(second.counters.inserted_or_upserted, 0);
    assert_eq!(rows_by_id(&destination), after_first);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn strict_with_continue_rejects_the_single_conflict() {
    let source = Arc::new(customers_source(20));
    let destination = customers_destination(DatabaseKind::Postgres);
    destination.seed(vec![existing_customer(5)]);

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::Strict, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.fetched, 20);
    assert_eq!(report.counters.inserted_or_upserted, 19);
    assert_eq!(report.counters.rejected, 1);
    assert_eq!(report.counters.duplicates_skipped, 0);

    assert_eq!(report.rejected_rows.len(), 1);
    let reject = &report.rejected_rows[0];
    assert!(reject.is_conflict());
    assert_eq!(reject.original_values().get_value("id"), Value::Int(5));

    let rows = rows_by_id(&destination);
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[4], existing_customer(5));
}

#[tokio::test]
async fn upsert_overwrites_existing_rows() {
    let source = Arc::new(customers_source(20));
    let destination = customers_destination(DatabaseKind::Postgres);
    destination.seed(vec![existing_customer(5)]);

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::Upsert, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.inserted_or_upserted, 20);
    assert_eq!(report.counters.duplicates_skipped, 0);
    let rows = rows_by_id(&destination);
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[4], customer_row(5));
}

#[tokio::test]
async fn unknown_source_column_fails_before_any_query() {
    let source = Arc::new(customers_source(5));
    let destination = customers_destination(DatabaseKind::Postgres);
    let mut mapping = customer_mapping();
    mapping[1].1 = "surname".to_string();

    let err = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(mapping),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::Mapping(MappingError::MissingSourceColumn { ref destination, ref column })
            if destination == "name" && column == "surname"
    ));
    assert!(source.queries().is_empty());
    assert!(destination.statements().is_empty());
}

#[tokio::test]
async fn missing_mapping_pairs_columns_by_name() {
    let rows = (1..=3)
        .map(|id| {
            RowData::from_pairs([
                ("ID", Value::Int(id)),
                ("Name", Value::String(format!("Customer {id}"))),
                ("notes", Value::String("ignored".into())),
            ])
        })
        .collect();
    let source = Arc::new(MemorySource::new("people", &["ID", "Name", "notes"], rows));
    let destination = customers_destination(DatabaseKind::Postgres);

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        None,
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.inserted_or_upserted, 3);
    let rows = rows_by_id(&destination);
    assert_eq!(
        rows[0],
        RowData::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::String("Customer 1".into())),
        ])
    );
}

#[tokio::test]
async fn mssql_skip_writes_row_by_row() {
    let source = Arc::new(customers_source(10));
    let destination = customers_destination(DatabaseKind::MsSql);
    destination.seed([2, 4, 6].into_iter().map(customer_row).collect());

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(5, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.inserted_or_upserted, 7);
    assert_eq!(report.counters.duplicates_skipped, 3);
    assert!(report.rejected_rows.is_empty());
    assert_eq!(destination.row_count(), 10);
    assert_eq!(destination.insert_count(), 10);

    let statements = destination.statements();
    assert_eq!(statements[0], "BEGIN TRANSACTION");
    assert_eq!(
        statements
            .iter()
            .filter(|s| *s == "SAVE TRANSACTION row_write")
            .count(),
        10
    );
    assert!(!statements.iter().any(|s| s.contains("batch_write")));
}

#[tokio::test]
async fn failing_rows_are_rejected_with_the_database_reason() {
    let source = Arc::new(customers_source(10));
    let destination = MemoryDestination::with_check(
        DatabaseKind::Postgres,
        "customers",
        &DESTINATION_COLUMNS,
        &["id"],
        "name",
        Value::String("Customer 7".into()),
    );

    let report = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.inserted_or_upserted, 9);
    assert_eq!(report.counters.rejected, 1);
    assert!(report.counters.is_balanced());
    let reject = &report.rejected_rows[0];
    assert!(!reject.is_conflict());
    assert!(reject.reason().contains("check constraint"));
    assert_eq!(reject.original_values(), &customer_row(7));
}

#[tokio::test]
async fn fatal_conflict_keeps_committed_batches() {
    let source = Arc::new(customers_source(50));
    let destination = customers_destination(DatabaseKind::Postgres);
    destination.seed(vec![existing_customer(25)]);

    let err = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::Strict, false),
    )
    .await
    .unwrap_err();

    let RuntimeError::Run(failure) = err else {
        panic!("expected a run failure, got {err:?}");
    };
    assert!(matches!(failure.error, ProcessingError::Conflict { batch: 3, .. }));
    assert_eq!(failure.batches, 2);
    assert_eq!(failure.counters.fetched, 30);
    assert_eq!(failure.counters.inserted_or_upserted, 20);
    assert!(failure.rejected_rows.is_empty());

    // 20 committed rows plus the seeded one; batch 3 left nothing behind.
    assert_eq!(destination.row_count(), 21);
    assert_eq!(
        destination.statements().last().map(String::as_str),
        Some("ROLLBACK")
    );
}

#[tokio::test]
async fn source_failure_aborts_after_committed_batches() {
    let source = Arc::new(customers_source(50).fail_after(25));
    let destination = customers_destination(DatabaseKind::Postgres);

    let err = run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap_err();

    let RuntimeError::Run(failure) = err else {
        panic!("expected a run failure, got {err:?}");
    };
    assert!(matches!(failure.error, ProcessingError::Extraction { batch: 3, .. }));
    assert_eq!(failure.counters.fetched, 20);
    assert_eq!(failure.counters.inserted_or_upserted, 20);
    assert_eq!(destination.row_count(), 20);
}

#[tokio::test]
async fn cancelled_before_start_writes_nothing() {
    let source = Arc::new(customers_source(20));
    let destination = customers_destination(DatabaseKind::Postgres);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_with(
        &RunController::new(cancel),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.batches, 0);
    assert_eq!(report.counters.fetched, 0);
    assert_eq!(destination.row_count(), 0);
}

#[tokio::test]
async fn cancellation_stops_at_a_batch_boundary() {
    let source = Arc::new(customers_source(10_000));
    let destination = customers_destination(DatabaseKind::Postgres);
    let cancel = CancellationToken::new();
    let (progress_tx, mut progress_rx) = watch::channel(RunProgress::default());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            if progress_rx.borrow().batches >= 2 {
                trigger.cancel();
                break;
            }
        }
    });

    let controller = RunController::new(cancel).with_progress(progress_tx);
    let report = run_with(
        &controller,
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(100, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.batches >= 2 && report.batches < 100);
    assert_eq!(report.counters.fetched, report.batches * 100);
    assert!(report.counters.is_balanced());
    assert_eq!(destination.row_count() as u64, report.counters.inserted_or_upserted);
}

#[tokio::test]
async fn progress_is_published_after_every_batch() {
    let source = Arc::new(customers_source(25));
    let destination = customers_destination(DatabaseKind::Postgres);
    let (progress_tx, progress_rx) = watch::channel(RunProgress::default());

    let controller = RunController::new(CancellationToken::new()).with_progress(progress_tx);
    let report = run_with(
        &controller,
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    let last = *progress_rx.borrow();
    assert_eq!(last.batches, 3);
    assert_eq!(last.counters, report.counters);
}

#[tokio::test]
async fn csv_file_is_normalized_to_destination_types() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"cust_id,full_name,is_active,balance\n\
          1,Ann,yes,\"1,234.50\"\n\
          2,Bob,no,\n\
          3,Cid,maybe,12\n",
    )
    .unwrap();

    let csv = CsvSource::open(file.path(), CsvSettings::default()).unwrap();
    let destination = customers_destination(DatabaseKind::Postgres);

    let report = run_with(
        &controller(),
        &SourceHandle::File(csv),
        &destination,
        Some(customer_mapping()),
        &settings(2, ConflictPolicy::SkipDuplicates, true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.fetched, 3);
    assert_eq!(report.counters.inserted_or_upserted, 3);
    assert_eq!(report.batches, 2);

    let rows = rows_by_id(&destination);
    assert_eq!(rows[0].get_value("id"), Value::Int(1));
    assert_eq!(rows[0].get_value("active"), Value::Boolean(true));
    assert_eq!(
        rows[0].get_value("balance"),
        Value::Decimal("1234.50".parse().unwrap())
    );
    assert_eq!(rows[1].get_value("balance"), Value::Null);
    assert_eq!(rows[2].get_value("active"), Value::Null);
}

#[tokio::test]
#[traced_test]
async fn row_fallback_is_logged() {
    let source = Arc::new(customers_source(10));
    let destination = customers_destination(DatabaseKind::Postgres);
    destination.seed(vec![existing_customer(3)]);

    run_with(
        &controller(),
        &table_handle(&source),
        &destination,
        Some(customer_mapping()),
        &settings(10, ConflictPolicy::Strict, true),
    )
    .await
    .unwrap();

    assert!(logs_contain("Set write failed, retrying row by row"));
    assert!(logs_contain("row_fallback"));
    assert!(logs_contain("Run finished"));
}
