use crate::sql::base::{error::DbError, metadata::TableMetadata};
use async_trait::async_trait;
use model::records::row::RowData;
use planner::query::{
    ast::{common::TableRef, select::Select},
    dialect::Dialect,
    renderer::render_with,
};

#[async_trait]
pub trait SqlAdapter: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Round-trips a trivial query.
    async fn ping(&self) -> Result<(), DbError>;

    /// Columns with declared types, plus the key columns.
    async fn table_metadata(&self, table: &TableRef) -> Result<TableMetadata, DbError>;

    /// Runs a read query and materializes every row. Only for small results.
    async fn query_rows(&self, sql: &str) -> Result<Vec<RowData>, DbError>;

    async fn preview(&self, table: &TableRef, limit: u64) -> Result<Vec<RowData>, DbError> {
        let (sql, _) = render_with(&Select::preview(table.clone(), limit), self.dialect());
        self.query_rows(&sql).await
    }
}
