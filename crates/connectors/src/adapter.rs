use crate::{
    error::AdapterError,
    sql::{
        base::{
            adapter::SqlAdapter, connection::ConnectionTarget, destination::DbDestination,
            source::RowSource,
        },
        mssql::adapter::MsSqlAdapter,
        mysql::adapter::MySqlAdapter,
        postgres::adapter::PgAdapter,
    },
};
use planner::query::dialect::DatabaseKind;
use std::sync::Arc;
use tracing::info;

/// An open connection to one of the supported backends.
#[derive(Clone)]
pub enum Adapter {
    Postgres(PgAdapter),
    MySql(MySqlAdapter),
    MsSql(MsSqlAdapter),
}

impl Adapter {
    pub async fn connect(
        kind: DatabaseKind,
        target: &ConnectionTarget,
    ) -> Result<Self, AdapterError> {
        info!(backend = %kind, target = %target.redacted(), "Connecting");
        let adapter = match kind {
            DatabaseKind::Postgres => Adapter::Postgres(PgAdapter::connect(target).await?),
            DatabaseKind::MySql => Adapter::MySql(MySqlAdapter::connect(target).await?),
            DatabaseKind::MsSql => Adapter::MsSql(MsSqlAdapter::connect(target).await?),
        };
        Ok(adapter)
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            Adapter::Postgres(_) => DatabaseKind::Postgres,
            Adapter::MySql(_) => DatabaseKind::MySql,
            Adapter::MsSql(_) => DatabaseKind::MsSql,
        }
    }

    pub fn get_sql(&self) -> &dyn SqlAdapter {
        match self {
            Adapter::Postgres(adapter) => adapter,
            Adapter::MySql(adapter) => adapter,
            Adapter::MsSql(adapter) => adapter,
        }
    }

    pub fn row_source(&self) -> Arc<dyn RowSource> {
        match self {
            Adapter::Postgres(adapter) => Arc::new(adapter.clone()),
            Adapter::MySql(adapter) => Arc::new(adapter.clone()),
            Adapter::MsSql(adapter) => Arc::new(adapter.clone()),
        }
    }

    pub fn destination(&self) -> Arc<dyn DbDestination> {
        match self {
            Adapter::Postgres(adapter) => Arc::new(adapter.clone()),
            Adapter::MySql(adapter) => Arc::new(adapter.clone()),
            Adapter::MsSql(adapter) => Arc::new(adapter.clone()),
        }
    }
}
