use crate::sql::{
    base::{
        adapter::SqlAdapter,
        connection::{ConnectionParams, ConnectionTarget, SslMode},
        destination::DbDestination,
        error::{ConnectorError, DbError},
        metadata::{ColumnMetadata, TableMetadata, pick_key_columns},
        source::{BatchReceiver, ChunkSender, RowSource},
    },
    mysql::{params::MySqlParamStore, row::decode_row},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use mysql_async::{Conn, Opts, OptsBuilder, Pool, prelude::Queryable};
use planner::query::{
    ast::{common::TableRef, insert::Insert, select::Select},
    dialect::{self, DatabaseKind, Dialect},
    renderer::render_with,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_TABLE_KEYS_SQL: &str = include_str!("sql/table_keys.sql");

/// MySQL / MariaDB access. Reads go through the pool; writes run on one
/// dedicated session so transaction and savepoint state stays on a single
/// connection.
#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
    session: Arc<Mutex<Conn>>,
    dialect: dialect::MySql,
}

impl MySqlAdapter {
    pub async fn connect(target: &ConnectionTarget) -> Result<Self, ConnectorError> {
        let opts = match target {
            ConnectionTarget::Url(url) => {
                Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?
            }
            ConnectionTarget::Params(params) => opts_from_params(params),
        };
        let pool = Pool::new(opts);
        let session = pool.get_conn().await?;
        Ok(MySqlAdapter {
            pool,
            session: Arc::new(Mutex::new(session)),
            dialect: dialect::MySql,
        })
    }
}

fn opts_from_params(params: &ConnectionParams) -> Opts {
    if params.ssl_mode == SslMode::Require {
        warn!("ssl_mode=require is not applied to MySQL parameter connections; use a connection URL");
    }
    OptsBuilder::default()
        .ip_or_hostname(params.host.clone())
        .tcp_port(params.port_for(DatabaseKind::MySql))
        .user(params.user.clone())
        .pass(params.password.clone())
        .db_name(params.database.clone())
        .into()
}

#[async_trait]
impl SqlAdapter for MySqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn table_metadata(&self, table: &TableRef) -> Result<TableMetadata, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let args = (table.schema.clone(), table.name.clone());

        let columns = conn
            .exec::<(String, String, String), _, _>(QUERY_TABLE_COLUMNS_SQL, args.clone())
            .await?
            .into_iter()
            .map(|(name, data_type, nullable)| ColumnMetadata {
                name,
                data_type,
                is_nullable: nullable.eq_ignore_ascii_case("yes"),
            })
            .collect::<Vec<_>>();

        let key_rows = conn
            .exec::<(String, String), _, _>(QUERY_TABLE_KEYS_SQL, args)
            .await?;

        debug!(table = %table, columns = columns.len(), "Loaded MySQL table metadata");
        Ok(TableMetadata {
            table: table.clone(),
            columns,
            key_columns: pick_key_columns(key_rows),
        })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<RowData>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<mysql_async::Row> = conn.query(sql).await?;
        Ok(rows.iter().map(decode_row).collect())
    }
}

impl RowSource for MySqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn stream(&self, select: &Select, chunk_size: usize) -> BatchReceiver {
        let (sql, params) = render_with(select, &self.dialect);
        let (mut sender, rx) = ChunkSender::channel(chunk_size);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let outcome = stream_result(&pool, &sql, &params, &mut sender).await;
            if let Err(err) = &outcome {
                warn!(%err, "MySQL result stream failed");
            }
            sender.finish(outcome).await;
        });

        rx
    }
}

/// Reads the result set row by row off the wire; the server streams it, so
/// only the chunk being filled is held in memory.
async fn stream_result(
    pool: &Pool,
    sql: &str,
    params: &[Value],
    sender: &mut ChunkSender,
) -> Result<(), DbError> {
    debug!(sql, "Opening MySQL result stream");
    let mut conn = pool.get_conn().await?;

    if params.is_empty() {
        let mut result = conn.query_iter(sql).await?;
        while let Some(row) = result.next().await? {
            if !sender.push(decode_row(&row)).await {
                return Ok(());
            }
        }
    } else {
        let bindings = MySqlParamStore::from_values(params);
        let mut result = conn.exec_iter(sql, bindings.params()).await?;
        while let Some(row) = result.next().await? {
            if !sender.push(decode_row(&row)).await {
                return Ok(());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DbDestination for MySqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        let mut conn = self.session.lock().await;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn insert(&self, insert: &Insert) -> Result<u64, DbError> {
        let (sql, params) = render_with(insert, &self.dialect);
        let bindings = MySqlParamStore::from_values(&params);
        let mut conn = self.session.lock().await;
        conn.exec_drop(sql, bindings.params()).await?;
        Ok(conn.affected_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fill_driver_options() {
        let opts = opts_from_params(&ConnectionParams {
            host: "mysql.internal".into(),
            port: None,
            database: Some("shop".into()),
            user: Some("etl".into()),
            password: None,
            ssl_mode: SslMode::Disable,
        });
        assert_eq!(opts.ip_or_hostname(), "mysql.internal");
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.db_name(), Some("shop"));
        assert_eq!(opts.user(), Some("etl"));
    }
}
