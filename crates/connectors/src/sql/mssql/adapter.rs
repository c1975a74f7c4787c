use crate::sql::{
    base::{
        adapter::SqlAdapter,
        connection::ConnectionTarget,
        destination::DbDestination,
        error::{ConnectorError, DbError},
        metadata::{ColumnMetadata, TableMetadata, pick_key_columns},
        source::{BatchReceiver, ChunkSender, RowSource},
    },
    mssql::{
        params::bind_values,
        row::decode_row,
        utils::{MsSqlClient, connect_client},
    },
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use model::{core::value::Value, records::row::RowData};
use planner::query::{
    ast::{common::TableRef, insert::Insert, select::Select},
    dialect::{self, DatabaseKind, Dialect},
    renderer::render_with,
};
use std::sync::Arc;
use tiberius::{Query, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_TABLE_KEYS_SQL: &str = include_str!("sql/table_keys.sql");

#[derive(Clone)]
pub struct MsSqlAdapter {
    client: Arc<Mutex<MsSqlClient>>,
    dialect: dialect::MsSql,
}

impl MsSqlAdapter {
    pub async fn connect(target: &ConnectionTarget) -> Result<Self, ConnectorError> {
        let client = connect_client(target).await?;
        Ok(MsSqlAdapter {
            client: Arc::new(Mutex::new(client)),
            dialect: dialect::MsSql,
        })
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut query = Query::new(sql.to_string());
        bind_values(&mut query, params);
        let mut client = self.client.lock().await;
        let rows = query.query(&mut *client).await?.into_first_result().await?;
        Ok(rows)
    }
}

fn text_cell(row: &Row, idx: usize) -> Result<String, DbError> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

#[async_trait]
impl SqlAdapter for MsSqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut client = self.client.lock().await;
        client.simple_query("SELECT 1").await?.into_results().await?;
        Ok(())
    }

    async fn table_metadata(&self, table: &TableRef) -> Result<TableMetadata, DbError> {
        let schema = table
            .schema
            .clone()
            .or(DatabaseKind::MsSql.default_schema().map(str::to_string))
            .unwrap_or_else(|| "dbo".to_string());
        let args = [Value::String(schema.clone()), Value::String(table.name.clone())];

        let columns = self
            .fetch_all(QUERY_TABLE_COLUMNS_SQL, &args)
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnMetadata {
                    name: text_cell(row, 0)?,
                    data_type: text_cell(row, 1)?,
                    is_nullable: text_cell(row, 2)?.eq_ignore_ascii_case("yes"),
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        let key_rows = self
            .fetch_all(QUERY_TABLE_KEYS_SQL, &args)
            .await?
            .iter()
            .map(|row| Ok((text_cell(row, 0)?, text_cell(row, 1)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        debug!(table = %table, columns = columns.len(), "Loaded SQL Server table metadata");
        Ok(TableMetadata {
            table: TableRef::new(Some(&schema), &table.name),
            columns,
            key_columns: pick_key_columns(key_rows),
        })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<RowData>, DbError> {
        self.fetch_all(sql, &[]).await?.iter().map(decode_row).collect()
    }
}

impl RowSource for MsSqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn stream(&self, select: &Select, chunk_size: usize) -> BatchReceiver {
        let (sql, params) = render_with(select, &self.dialect);
        let (mut sender, rx) = ChunkSender::channel(chunk_size);
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut client = client.lock_owned().await;
            let outcome = stream_rows(&mut client, sql, &params, &mut sender).await;
            if let Err(err) = &outcome {
                warn!(%err, "SQL Server row stream failed");
            }
            sender.finish(outcome).await;
        });

        rx
    }
}

/// TDS delivers rows as the server produces them, so the stream is consumed
/// row by row without buffering the full result.
async fn stream_rows(
    client: &mut MsSqlClient,
    sql: String,
    params: &[Value],
    sender: &mut ChunkSender,
) -> Result<(), DbError> {
    debug!(sql = %sql, "Opening SQL Server row stream");
    let mut query = Query::new(sql);
    bind_values(&mut query, params);
    let mut rows = query.query(client).await?.into_row_stream();
    while let Some(row) = rows.try_next().await? {
        if !sender.push(decode_row(&row)?).await {
            return Ok(());
        }
    }
    Ok(())
}

#[async_trait]
impl DbDestination for MsSqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        let mut client = self.client.lock().await;
        client.execute(sql, &[]).await?;
        Ok(())
    }

    async fn insert(&self, insert: &Insert) -> Result<u64, DbError> {
        let (sql, params) = render_with(insert, &self.dialect);
        let mut query = Query::new(sql);
        bind_values(&mut query, &params);
        let mut client = self.client.lock().await;
        let result = query.execute(&mut *client).await?;
        Ok(result.total())
    }
}
