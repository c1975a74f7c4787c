use crate::sql::{
    base::{
        adapter::SqlAdapter,
        connection::ConnectionTarget,
        destination::DbDestination,
        error::{ConnectorError, DbError},
        metadata::{ColumnMetadata, TableMetadata, pick_key_columns},
        source::{BatchReceiver, ChunkSender, RowSource},
    },
    postgres::{
        params::{PgParamStore, cast_placeholders, text_casts},
        row::decode_row,
        utils::connect_client,
    },
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use planner::query::{
    ast::{common::TableRef, insert::Insert, select::Select},
    dialect::{self, DatabaseKind, Dialect},
    renderer::render_with,
};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio_postgres::{Client, GenericClient, Statement};
use tracing::{debug, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_TABLE_KEYS_SQL: &str = include_str!("sql/table_keys.sql");

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
    dialect: dialect::Postgres,
}

impl PgAdapter {
    pub async fn connect(target: &ConnectionTarget) -> Result<Self, ConnectorError> {
        let client = Arc::new(RwLock::new(connect_client(target).await?));
        Ok(PgAdapter {
            client,
            dialect: dialect::Postgres,
        })
    }

    fn schema_of<'a>(table: &'a TableRef) -> &'a str {
        table
            .schema
            .as_deref()
            .or(DatabaseKind::Postgres.default_schema())
            .unwrap_or("public")
    }
}

#[async_trait]
impl SqlAdapter for PgAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn table_metadata(&self, table: &TableRef) -> Result<TableMetadata, DbError> {
        let schema = Self::schema_of(table);
        let client = self.client.read().await;

        let columns = client
            .query(QUERY_TABLE_COLUMNS_SQL, &[&schema, &table.name])
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnMetadata {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    is_nullable: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        let key_rows = client
            .query(QUERY_TABLE_KEYS_SQL, &[&schema, &table.name])
            .await?
            .iter()
            .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
            .collect::<Result<Vec<(String, String)>, DbError>>()?;

        debug!(table = %table, columns = columns.len(), "Loaded Postgres table metadata");
        Ok(TableMetadata {
            table: TableRef::new(Some(schema), &table.name),
            columns,
            key_columns: pick_key_columns(key_rows),
        })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<RowData>, DbError> {
        let client = self.client.read().await;
        let rows = client.query(sql, &[]).await?;
        rows.iter().map(decode_row).collect()
    }
}

impl RowSource for PgAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn stream(&self, select: &Select, chunk_size: usize) -> BatchReceiver {
        let (sql, params) = render_with(select, &self.dialect);
        let (mut sender, rx) = ChunkSender::channel(chunk_size);
        let client = self.client.clone();

        tokio::spawn(async move {
            let guard = client.write_owned().await;
            let outcome = stream_portal(guard, &sql, &params, chunk_size, &mut sender).await;
            if let Err(err) = &outcome {
                warn!(%err, "Postgres cursor failed");
            }
            sender.finish(outcome).await;
        });

        rx
    }
}

/// Prepares `sql` and converts `params` for it. Values a slot cannot take
/// natively are sent as text and cast by the server, which needs the
/// statement prepared again with the casts in place.
async fn prepare_bound<C>(
    client: &C,
    sql: &str,
    params: &[Value],
) -> Result<(Statement, PgParamStore), DbError>
where
    C: GenericClient + Sync,
{
    let mut statement = client.prepare(sql).await?;
    if let Some(casts) = text_casts(params, statement.params()) {
        let cast_sql = cast_placeholders(sql, &casts);
        debug!(sql = %cast_sql, "Preparing with text casts");
        statement = client.prepare(&cast_sql).await?;
    }
    let bindings = PgParamStore::for_types(params, statement.params())?;
    Ok((statement, bindings))
}

/// Pulls the result through a server-side portal `chunk_size` rows at a time
/// inside a read-only transaction.
async fn stream_portal(
    mut client: OwnedRwLockWriteGuard<Client>,
    sql: &str,
    params: &[Value],
    chunk_size: usize,
    sender: &mut ChunkSender,
) -> Result<(), DbError> {
    debug!(sql, "Opening Postgres cursor");
    let tx = client.build_transaction().read_only(true).start().await?;
    let (statement, bindings) = prepare_bound(&tx, sql, params).await?;
    let portal = tx.bind(&statement, &bindings.as_refs()).await?;
    let max_rows = i32::try_from(chunk_size.max(1)).unwrap_or(i32::MAX);

    loop {
        let rows = tx.query_portal(&portal, max_rows).await?;
        let fetched = rows.len();
        for row in &rows {
            if !sender.push(decode_row(row)?).await {
                debug!("Row receiver dropped, closing Postgres cursor");
                return Ok(());
            }
        }
        if fetched < max_rows as usize {
            break;
        }
    }

    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl DbDestination for PgAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn insert(&self, insert: &Insert) -> Result<u64, DbError> {
        let (sql, params) = render_with(insert, &self.dialect);
        let client = self.client.read().await;
        let (statement, bindings) = prepare_bound(&*client, &sql, &params).await?;
        let affected = client.execute(&statement, &bindings.as_refs()).await?;
        Ok(affected)
    }
}
