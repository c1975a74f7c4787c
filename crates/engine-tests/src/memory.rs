//! In-memory stand-ins for a source table and a destination table, used to
//! drive the engine without a database server.

use async_trait::async_trait;
use connectors::sql::base::{
    destination::DbDestination,
    error::DbError,
    metadata::{ColumnMetadata, TableMetadata},
    source::{BatchReceiver, ChunkSender, RowSource},
};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use planner::query::{
    ast::{
        common::TableRef,
        expr::Expr,
        insert::{ConflictAction, Insert},
        select::Select,
    },
    dialect::{DatabaseKind, Dialect},
    renderer::render_with,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

/// A source table whose rows are streamed in insertion order.
pub struct MemorySource {
    kind: DatabaseKind,
    table: TableRef,
    columns: Vec<String>,
    rows: Arc<Vec<RowData>>,
    fail_after: Option<usize>,
    queries: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(table: &str, columns: &[&str], rows: Vec<RowData>) -> Self {
        Self {
            kind: DatabaseKind::Postgres,
            table: TableRef::new(Some("public"), table),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Arc::new(rows),
            fail_after: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Breaks the stream after `rows` rows, like a dropped connection.
    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// SELECT statements issued so far, rendered in the source dialect.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

impl RowSource for MemorySource {
    fn dialect(&self) -> &dyn Dialect {
        self.kind.dialect()
    }

    fn stream(&self, select: &Select, chunk_size: usize) -> BatchReceiver {
        let (sql, _) = render_with(select, self.dialect());
        lock(&self.queries).push(sql);

        let projection: Vec<(String, Expr)> = select
            .columns
            .iter()
            .map(|column| match column {
                Expr::Alias { expr, alias } => (alias.clone(), (**expr).clone()),
                other => (String::new(), other.clone()),
            })
            .collect();
        let rows = Arc::clone(&self.rows);
        let fail_after = self.fail_after;

        let (mut sender, rx) = ChunkSender::channel(chunk_size);
        tokio::spawn(async move {
            for (i, row) in rows.iter().enumerate() {
                if fail_after == Some(i) {
                    sender
                        .finish(Err(DbError::Unknown("server closed the connection".into())))
                        .await;
                    return;
                }
                if !sender.push(project(&projection, row)).await {
                    return;
                }
            }
            sender.finish(Ok(())).await;
        });
        rx
    }
}

fn project(projection: &[(String, Expr)], row: &RowData) -> RowData {
    RowData::new(
        projection
            .iter()
            .map(|(alias, expr)| {
                let value = match expr {
                    Expr::Identifier(ident) => row.get_value(&ident.name),
                    Expr::StringLiteral(text) => Value::String(text.clone()),
                    _ => Value::Null,
                };
                FieldValue::new(alias.clone(), value)
            })
            .collect(),
    )
}

enum Undo {
    Inserted,
    Replaced(usize, RowData),
}

#[derive(Default)]
struct TableState {
    rows: Vec<RowData>,
    index: HashMap<Vec<Option<String>>, usize>,
    in_transaction: bool,
    /// A statement failed; only a rollback is accepted until then.
    aborted: bool,
    undo: Vec<Undo>,
    savepoints: Vec<(String, usize)>,
}

impl TableState {
    fn revert_to(&mut self, mark: usize, keys: &[String]) {
        while self.undo.len() > mark {
            match self.undo.pop() {
                Some(Undo::Inserted) => {
                    if let Some(row) = self.rows.pop() {
                        self.index.remove(&key_of(&row, keys));
                    }
                }
                Some(Undo::Replaced(at, old)) => self.rows[at] = old,
                None => break,
            }
        }
    }
}

/// A destination table with a unique key, transactions and savepoints.
///
/// Statements are matched against what the configured dialect would emit.
/// A failing statement leaves no trace. Under Postgres it also aborts the
/// open transaction until a rollback.
pub struct MemoryDestination {
    kind: DatabaseKind,
    table: TableRef,
    columns: Vec<ColumnMetadata>,
    keys: Vec<String>,
    invalid: Vec<(String, Value)>,
    state: Mutex<TableState>,
    statements: Mutex<Vec<String>>,
}

impl MemoryDestination {
    pub fn new(
        kind: DatabaseKind,
        table: &str,
        columns: &[(&str, &str)],
        keys: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self::build(kind, table, columns, keys, Vec::new()))
    }

    /// Like [`MemoryDestination::new`], rejecting any row whose `column`
    /// holds `value` the way a check constraint would.
    pub fn with_check(
        kind: DatabaseKind,
        table: &str,
        columns: &[(&str, &str)],
        keys: &[&str],
        column: &str,
        value: Value,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            kind,
            table,
            columns,
            keys,
            vec![(column.to_string(), value)],
        ))
    }

    fn build(
        kind: DatabaseKind,
        table: &str,
        columns: &[(&str, &str)],
        keys: &[&str],
        invalid: Vec<(String, Value)>,
    ) -> Self {
        Self {
            kind,
            table: TableRef::new(None, table).or_schema(kind.default_schema()),
            columns: columns
                .iter()
                .map(|(name, data_type)| ColumnMetadata {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                    is_nullable: true,
                })
                .collect(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            invalid,
            state: Mutex::new(TableState::default()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn metadata(&self) -> TableMetadata {
        TableMetadata {
            table: self.table.clone(),
            columns: self.columns.clone(),
            key_columns: self.keys.clone(),
        }
    }

    /// Committed and in-flight rows, in insertion order.
    pub fn rows(&self) -> Vec<RowData> {
        lock(&self.state).rows.clone()
    }

    pub fn row_count(&self) -> usize {
        lock(&self.state).rows.len()
    }

    /// Inserts rows outside any transaction, e.g. to seed existing data.
    pub fn seed(&self, rows: Vec<RowData>) {
        let mut state = lock(&self.state);
        for row in rows {
            let key = key_of(&row, &self.keys);
            let at = state.rows.len();
            state.index.insert(key, at);
            state.rows.push(row);
        }
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    pub fn insert_count(&self) -> usize {
        lock(&self.statements)
            .iter()
            .filter(|s| s.starts_with("INSERT"))
            .count()
    }

    fn apply_insert(&self, state: &mut TableState, insert: &Insert) -> Result<u64, DbError> {
        let mut affected = 0;
        for values in &insert.values {
            let row = RowData::new(
                insert
                    .columns
                    .iter()
                    .zip(values)
                    .map(|(column, expr)| {
                        let value = match expr {
                            Expr::Value(value) => value.clone(),
                            Expr::StringLiteral(text) => Value::String(text.clone()),
                            _ => Value::Null,
                        };
                        FieldValue::new(column.clone(), value)
                    })
                    .collect(),
            );

            if let Some((column, _)) = self
                .invalid
                .iter()
                .find(|(column, value)| row.get_value(column) == *value)
            {
                return Err(DbError::Write(format!(
                    "new row violates check constraint on \"{column}\""
                )));
            }

            let key = key_of(&row, &self.keys);
            match state.index.get(&key).copied() {
                None => {
                    let at = state.rows.len();
                    state.index.insert(key, at);
                    state.rows.push(row);
                    state.undo.push(Undo::Inserted);
                    affected += 1;
                }
                Some(at) => match insert.on_conflict.as_ref().map(|c| &c.action) {
                    None => {
                        return Err(DbError::UniqueViolation(format!(
                            "duplicate key value violates unique constraint \"{}_pkey\"",
                            self.table.name
                        )));
                    }
                    Some(ConflictAction::DoNothing) => {}
                    Some(ConflictAction::DoUpdate { assignments }) => {
                        let old = state.rows[at].clone();
                        let mut updated = old.clone();
                        for assignment in assignments {
                            let value = row.get_value(&assignment.column);
                            if let Some(field) = updated
                                .field_values
                                .iter_mut()
                                .find(|f| f.name == assignment.column)
                            {
                                field.value = value;
                            }
                        }
                        state.rows[at] = updated;
                        state.undo.push(Undo::Replaced(at, old));
                        affected += 1;
                    }
                },
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl DbDestination for MemoryDestination {
    fn dialect(&self) -> &dyn Dialect {
        self.kind.dialect()
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        lock(&self.statements).push(sql.to_string());
        let dialect = self.dialect();
        let mut state = lock(&self.state);
        let name = sql.rsplit(' ').next().unwrap_or_default().to_string();

        if sql == dialect.begin_transaction() {
            state.in_transaction = true;
            state.aborted = false;
            state.undo.clear();
            state.savepoints.clear();
        } else if sql == dialect.commit_transaction() {
            if state.aborted {
                return Err(DbError::Write("cannot commit an aborted transaction".into()));
            }
            state.in_transaction = false;
            state.undo.clear();
            state.savepoints.clear();
        } else if sql == dialect.rollback_transaction() {
            state.revert_to(0, &self.keys);
            state.in_transaction = false;
            state.aborted = false;
            state.savepoints.clear();
        } else if sql == dialect.rollback_to_savepoint(&name) {
            let Some(pos) = state.savepoints.iter().rposition(|(n, _)| *n == name) else {
                return Err(DbError::Write(format!("savepoint \"{name}\" does not exist")));
            };
            let mark = state.savepoints[pos].1;
            state.revert_to(mark, &self.keys);
            state.savepoints.truncate(pos + 1);
            state.aborted = false;
        } else if state.aborted {
            return Err(DbError::Write(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .into(),
            ));
        } else if sql == dialect.savepoint(&name) {
            let mark = state.undo.len();
            state.savepoints.push((name, mark));
        } else if dialect.release_savepoint(&name).as_deref() == Some(sql) {
            if let Some(pos) = state.savepoints.iter().rposition(|(n, _)| *n == name) {
                state.savepoints.truncate(pos);
            }
        } else {
            return Err(DbError::Unknown(format!("unsupported statement: {sql}")));
        }
        Ok(())
    }

    async fn insert(&self, insert: &Insert) -> Result<u64, DbError> {
        let (sql, _) = render_with(insert, self.dialect());
        lock(&self.statements).push(sql);

        let mut state = lock(&self.state);
        if state.aborted {
            return Err(DbError::Write("current transaction is aborted".into()));
        }
        let mark = state.undo.len();
        match self.apply_insert(&mut state, insert) {
            Ok(affected) => {
                if !state.in_transaction {
                    state.undo.clear();
                }
                Ok(affected)
            }
            Err(err) => {
                state.revert_to(mark, &self.keys);
                if state.in_transaction && self.kind == DatabaseKind::Postgres {
                    state.aborted = true;
                }
                Err(err)
            }
        }
    }
}

fn key_of(row: &RowData, keys: &[String]) -> Vec<Option<String>> {
    keys.iter().map(|k| row.get_value(k).to_text()).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
