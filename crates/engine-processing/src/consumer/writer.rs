use crate::error::ProcessingError;
use connectors::sql::base::{destination::DbDestination, error::DbError};
use model::{
    execution::{conflict::ConflictPolicy, counters::RunCounters, rejected_row::RejectedRow},
    records::{batch::Batch, row::RowData},
};
use planner::query::{
    ast::{
        common::TableRef,
        expr::Expr,
        insert::{Insert, OnConflict},
    },
    dialect::UnsupportedCapability,
};
use std::{future::Future, sync::Arc, time::Duration, time::Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const BATCH_SAVEPOINT: &str = "batch_write";
const ROW_SAVEPOINT: &str = "row_write";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Multi-row inserts covering the whole batch.
    SetWrite,
    /// One insert per row, each behind its own savepoint.
    RowFallback,
}

impl WriteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStrategy::SetWrite => "set_write",
            WriteStrategy::RowFallback => "row_fallback",
        }
    }
}

/// Settled result of one committed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub counters: RunCounters,
    pub rejected: Vec<RejectedRow>,
    pub strategy: WriteStrategy,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub policy: ConflictPolicy,
    pub continue_on_error: bool,
    /// Bound on every destination statement.
    pub statement_timeout: Option<Duration>,
}

enum WriteState {
    AttemptSetWrite,
    RowFallback,
}

/// Writes batches into one destination table, one transaction per batch.
///
/// A batch first goes out as set-based inserts using the policy's conflict
/// clause. When that is impossible (no native clause) or fails in a way the
/// policy can absorb, the batch is rolled back to its savepoint and written
/// row by row, turning each failure into a duplicate or a reject.
pub struct ConflictAwareWriter {
    destination: Arc<dyn DbDestination>,
    table: TableRef,
    columns: Vec<String>,
    options: WriterOptions,
    clause: Result<Option<OnConflict>, UnsupportedCapability>,
}

impl ConflictAwareWriter {
    /// `columns` are the mapped destination columns in insert order; `keys`
    /// the table's primary or unique key.
    pub fn new(
        destination: Arc<dyn DbDestination>,
        table: TableRef,
        columns: Vec<String>,
        keys: &[String],
        options: WriterOptions,
    ) -> Self {
        let dialect = destination.dialect();
        let clause = match options.policy {
            ConflictPolicy::Strict => Ok(None),
            ConflictPolicy::SkipDuplicates => dialect.skip_duplicates(keys).map(Some),
            ConflictPolicy::Upsert => dialect.upsert(keys, &columns).map(Some),
        };

        if let Err(reason) = &clause {
            warn!(
                table = %table,
                policy = %options.policy,
                reason = %reason,
                "No set-based conflict clause, batches will be written row by row"
            );
        }

        Self {
            destination,
            table,
            columns,
            options,
            clause,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Writes `batch` in its own transaction. On error the transaction is
    /// rolled back and nothing of the batch is kept.
    pub async fn write_batch(&self, batch: &Batch) -> Result<BatchOutcome, ProcessingError> {
        let start = Instant::now();
        if batch.is_empty() {
            return Ok(BatchOutcome {
                counters: RunCounters::default(),
                rejected: Vec::new(),
                strategy: WriteStrategy::SetWrite,
                duration: start.elapsed(),
            });
        }

        self.guarded(self.destination.begin())
            .await
            .map_err(|err| self.write_error(batch.seq, err))?;

        let outcome = match self.run_batch(batch).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(rollback_err) = self.guarded(self.destination.rollback()).await {
                    warn!(batch = batch.seq, error = %rollback_err, "Rollback failed");
                }
                return Err(err);
            }
        };

        self.guarded(self.destination.commit())
            .await
            .map_err(|err| self.write_error(batch.seq, err))?;

        let outcome = BatchOutcome {
            duration: start.elapsed(),
            ..outcome
        };
        info!(
            batch = batch.seq,
            rows = batch.len(),
            inserted = outcome.counters.inserted_or_upserted,
            duplicates = outcome.counters.duplicates_skipped,
            rejected = outcome.counters.rejected,
            strategy = outcome.strategy.as_str(),
            duration_ms = outcome.duration.as_millis(),
            "Batch committed"
        );
        Ok(outcome)
    }

    async fn run_batch(&self, batch: &Batch) -> Result<BatchOutcome, ProcessingError> {
        let mut state = match &self.clause {
            Ok(_) => WriteState::AttemptSetWrite,
            Err(_) => WriteState::RowFallback,
        };

        loop {
            match state {
                WriteState::AttemptSetWrite => {
                    self.savepoint(batch.seq, BATCH_SAVEPOINT).await?;
                    match self.set_write(&batch.rows).await {
                        Ok(affected) => {
                            self.release(batch.seq, BATCH_SAVEPOINT).await?;
                            return Ok(self.set_outcome(batch.len() as u64, affected));
                        }
                        Err(err) => {
                            self.rollback_to(batch.seq, BATCH_SAVEPOINT).await?;
                            if !self.falls_back_on(&err) {
                                return Err(self.fatal(batch.seq, err));
                            }
                            warn!(
                                batch = batch.seq,
                                rows = batch.len(),
                                error = %err.reason(),
                                "Set write failed, retrying row by row"
                            );
                            state = WriteState::RowFallback;
                        }
                    }
                }
                WriteState::RowFallback => return self.row_fallback(batch).await,
            }
        }
    }

    fn falls_back_on(&self, err: &DbError) -> bool {
        match self.options.policy {
            ConflictPolicy::Strict => self.options.continue_on_error,
            ConflictPolicy::SkipDuplicates | ConflictPolicy::Upsert => {
                err.is_unique_violation() || self.options.continue_on_error
            }
        }
    }

    fn set_outcome(&self, rows: u64, affected: u64) -> BatchOutcome {
        let inserted = match self.options.policy {
            ConflictPolicy::SkipDuplicates => affected.min(rows),
            ConflictPolicy::Strict | ConflictPolicy::Upsert => rows,
        };
        BatchOutcome {
            counters: RunCounters {
                fetched: rows,
                inserted_or_upserted: inserted,
                duplicates_skipped: rows - inserted,
                rejected: 0,
            },
            rejected: Vec::new(),
            strategy: WriteStrategy::SetWrite,
            duration: Duration::ZERO,
        }
    }

    /// Splits `rows` into statements that stay under the backend's bind limit.
    /// All statements share the open transaction.
    async fn set_write(&self, rows: &[RowData]) -> Result<u64, DbError> {
        let per_statement = self.rows_per_statement();
        let mut affected = 0;
        for chunk in rows.chunks(per_statement) {
            affected += self.insert(chunk).await?;
        }
        Ok(affected)
    }

    fn rows_per_statement(&self) -> usize {
        let limit = self.destination.dialect().max_bind_params();
        (limit / self.columns.len().max(1)).max(1)
    }

    async fn row_fallback(&self, batch: &Batch) -> Result<BatchOutcome, ProcessingError> {
        let mut counters = RunCounters {
            fetched: batch.len() as u64,
            ..RunCounters::default()
        };
        let mut rejected = Vec::new();

        for row in &batch.rows {
            self.savepoint(batch.seq, ROW_SAVEPOINT).await?;
            match self.insert(std::slice::from_ref(row)).await {
                Ok(affected) => {
                    self.release(batch.seq, ROW_SAVEPOINT).await?;
                    if affected == 0 && self.options.policy == ConflictPolicy::SkipDuplicates {
                        counters.duplicates_skipped += 1;
                    } else {
                        counters.inserted_or_upserted += 1;
                    }
                }
                Err(err) => {
                    self.rollback_to(batch.seq, ROW_SAVEPOINT).await?;
                    match self.row_failure(row, err) {
                        RowFailure::Duplicate => counters.duplicates_skipped += 1,
                        RowFailure::Rejected(reject) => {
                            debug!(batch = batch.seq, reason = %reject.reason(), "Row rejected");
                            counters.rejected += 1;
                            rejected.push(reject);
                        }
                        RowFailure::Fatal(err) => return Err(self.fatal(batch.seq, err)),
                    }
                }
            }
        }

        Ok(BatchOutcome {
            counters,
            rejected,
            strategy: WriteStrategy::RowFallback,
            duration: Duration::ZERO,
        })
    }

    fn row_failure(&self, row: &RowData, err: DbError) -> RowFailure {
        let continue_on_error = self.options.continue_on_error;
        if err.is_unique_violation() {
            return match self.options.policy {
                ConflictPolicy::SkipDuplicates | ConflictPolicy::Upsert => RowFailure::Duplicate,
                ConflictPolicy::Strict if continue_on_error => {
                    RowFailure::Rejected(RejectedRow::conflict(row.clone()))
                }
                ConflictPolicy::Strict => RowFailure::Fatal(err),
            };
        }
        if continue_on_error {
            RowFailure::Rejected(RejectedRow::new(row.clone(), err.reason()))
        } else {
            RowFailure::Fatal(err)
        }
    }

    async fn insert(&self, rows: &[RowData]) -> Result<u64, DbError> {
        let insert = Insert {
            table: self.table.clone(),
            columns: self.columns.clone(),
            values: rows
                .iter()
                .map(|row| {
                    self.columns
                        .iter()
                        .map(|column| Expr::Value(row.get_value(column)))
                        .collect()
                })
                .collect(),
            on_conflict: self.clause.clone().ok().flatten(),
        };
        self.guarded(self.destination.insert(&insert)).await
    }

    async fn savepoint(&self, batch: u64, name: &str) -> Result<(), ProcessingError> {
        self.guarded(self.destination.savepoint(name))
            .await
            .map_err(|err| self.write_error(batch, err))
    }

    async fn release(&self, batch: u64, name: &str) -> Result<(), ProcessingError> {
        self.guarded(self.destination.release_savepoint(name))
            .await
            .map_err(|err| self.write_error(batch, err))
    }

    async fn rollback_to(&self, batch: u64, name: &str) -> Result<(), ProcessingError> {
        self.guarded(self.destination.rollback_to_savepoint(name))
            .await
            .map_err(|err| self.write_error(batch, err))
    }

    async fn guarded<T>(
        &self,
        op: impl Future<Output = Result<T, DbError>>,
    ) -> Result<T, DbError> {
        match self.options.statement_timeout {
            Some(limit) => timeout(limit, op)
                .await
                .map_err(|_| DbError::Timeout(limit))?,
            None => op.await,
        }
    }

    fn fatal(&self, batch: u64, err: DbError) -> ProcessingError {
        if err.is_unique_violation() {
            ProcessingError::Conflict { batch, source: err }
        } else {
            self.write_error(batch, err)
        }
    }

    fn write_error(&self, batch: u64, err: DbError) -> ProcessingError {
        ProcessingError::Write {
            batch,
            table: self.table.to_string(),
            source: err,
        }
    }
}

enum RowFailure {
    Duplicate,
    Rejected(RejectedRow),
    Fatal(DbError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::core::value::Value;
    use planner::query::{
        ast::insert::ConflictAction,
        dialect::{DatabaseKind, Dialect},
    };
    use std::{collections::HashSet, sync::Mutex};
    use tracing_test::traced_test;

    /// Destination that fails inserts touching listed ids, the way a backend
    /// with a unique key on `id` would.
    struct ScriptedDestination {
        kind: DatabaseKind,
        existing: HashSet<i64>,
        broken: HashSet<i64>,
        statements: Mutex<Vec<String>>,
        inserts: Mutex<Vec<usize>>,
    }

    impl ScriptedDestination {
        fn new(kind: DatabaseKind, existing: &[i64], broken: &[i64]) -> Arc<Self> {
            Arc::new(Self {
                kind,
                existing: existing.iter().copied().collect(),
                broken: broken.iter().copied().collect(),
                statements: Mutex::new(Vec::new()),
                inserts: Mutex::new(Vec::new()),
            })
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DbDestination for ScriptedDestination {
        fn dialect(&self) -> &dyn Dialect {
            self.kind.dialect()
        }

        async fn execute(&self, sql: &str) -> Result<(), DbError> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(())
        }

        async fn insert(&self, insert: &Insert) -> Result<u64, DbError> {
            self.inserts.lock().unwrap().push(insert.values.len());
            let ids: Vec<i64> = insert
                .values
                .iter()
                .map(|row| match &row[0] {
                    Expr::Value(Value::Int(id)) => *id,
                    other => panic!("unexpected id {other:?}"),
                })
                .collect();

            if ids.iter().any(|id| self.broken.contains(id)) {
                return Err(DbError::Write("value too long for column".into()));
            }
            let conflicts = ids.iter().filter(|id| self.existing.contains(id)).count() as u64;
            match insert.on_conflict.as_ref().map(|c| &c.action) {
                Some(ConflictAction::DoNothing) => Ok(ids.len() as u64 - conflicts),
                Some(ConflictAction::DoUpdate { .. }) => Ok(ids.len() as u64),
                None if conflicts > 0 => Err(DbError::UniqueViolation("users_pkey".into())),
                None => Ok(ids.len() as u64),
            }
        }
    }

    fn batch(ids: std::ops::Range<i64>) -> Batch {
        Batch::new(
            1,
            ids.map(|id| RowData::from_pairs([("id", Value::Int(id)), ("name", Value::from("n"))]))
                .collect(),
        )
    }

    fn writer(
        destination: Arc<ScriptedDestination>,
        policy: ConflictPolicy,
        continue_on_error: bool,
    ) -> ConflictAwareWriter {
        ConflictAwareWriter::new(
            destination,
            TableRef::new(Some("public"), "users"),
            vec!["id".to_string(), "name".to_string()],
            &["id".to_string()],
            WriterOptions {
                policy,
                continue_on_error,
                statement_timeout: None,
            },
        )
    }

    #[tokio::test]
    async fn skip_duplicates_counts_from_affected_rows() {
        let dest = ScriptedDestination::new(DatabaseKind::Postgres, &[2, 4], &[]);
        let outcome = writer(dest.clone(), ConflictPolicy::SkipDuplicates, true)
            .write_batch(&batch(0..10))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, WriteStrategy::SetWrite);
        assert_eq!(outcome.counters.inserted_or_upserted, 8);
        assert_eq!(outcome.counters.duplicates_skipped, 2);
        assert!(outcome.counters.is_balanced());
        assert_eq!(
            dest.statements(),
            vec![
                "BEGIN",
                "SAVEPOINT batch_write",
                "RELEASE SAVEPOINT batch_write",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn strict_conflict_is_rejected_when_continuing() {
        let dest = ScriptedDestination::new(DatabaseKind::Postgres, &[3], &[]);
        let outcome = writer(dest.clone(), ConflictPolicy::Strict, true)
            .write_batch(&batch(0..5))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, WriteStrategy::RowFallback);
        assert_eq!(outcome.counters.inserted_or_upserted, 4);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.rejected[0].is_conflict());
        assert_eq!(outcome.rejected[0].original_values().get_value("id"), Value::Int(3));
        assert!(
            dest.statements()
                .contains(&"ROLLBACK TO SAVEPOINT batch_write".to_string())
        );
        assert!(logs_contain("Set write failed, retrying row by row"));
    }

    #[tokio::test]
    async fn strict_conflict_aborts_without_continue() {
        let dest = ScriptedDestination::new(DatabaseKind::Postgres, &[3], &[]);
        let err = writer(dest.clone(), ConflictPolicy::Strict, false)
            .write_batch(&batch(0..5))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::Conflict { batch: 1, .. }));
        assert_eq!(dest.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn other_row_errors_become_rejects() {
        let dest = ScriptedDestination::new(DatabaseKind::Postgres, &[1], &[4]);
        let outcome = writer(dest, ConflictPolicy::SkipDuplicates, true)
            .write_batch(&batch(0..6))
            .await
            .unwrap();

        assert_eq!(outcome.counters.inserted_or_upserted, 4);
        assert_eq!(outcome.counters.duplicates_skipped, 1);
        assert_eq!(outcome.counters.rejected, 1);
        assert_eq!(
            outcome.rejected[0].reason(),
            "Write error: value too long for column"
        );
    }

    #[tokio::test]
    async fn other_errors_abort_without_continue() {
        let dest = ScriptedDestination::new(DatabaseKind::Postgres, &[], &[4]);
        let err = writer(dest, ConflictPolicy::SkipDuplicates, false)
            .write_batch(&batch(0..6))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Write { batch: 1, .. }));
    }

    #[tokio::test]
    async fn mssql_skip_goes_straight_to_rows() {
        let dest = ScriptedDestination::new(DatabaseKind::MsSql, &[0, 1], &[]);
        let outcome = writer(dest.clone(), ConflictPolicy::SkipDuplicates, false)
            .write_batch(&batch(0..4))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, WriteStrategy::RowFallback);
        assert_eq!(outcome.counters.duplicates_skipped, 2);
        assert_eq!(outcome.counters.inserted_or_upserted, 2);
        let statements = dest.statements();
        assert!(!statements.iter().any(|s| s.contains("batch_write")));
        assert_eq!(
            statements.iter().filter(|s| *s == "SAVE TRANSACTION row_write").count(),
            4
        );
    }

    #[tokio::test]
    async fn set_write_respects_bind_limit() {
        let dest = ScriptedDestination::new(DatabaseKind::MsSql, &[], &[]);
        let outcome = writer(dest.clone(), ConflictPolicy::Strict, false)
            .write_batch(&batch(0..2500))
            .await
            .unwrap();

        assert_eq!(outcome.counters.inserted_or_upserted, 2500);
        assert_eq!(*dest.inserts.lock().unwrap(), vec![1000, 1000, 500]);
    }
}
