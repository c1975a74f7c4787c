use crate::sql::base::error::DbError;
use async_trait::async_trait;
use planner::query::{ast::insert::Insert, dialect::Dialect};

/// A write session on the destination. Transaction and savepoint statements
/// come from the dialect; implementations only need `execute` and `insert`.
#[async_trait]
pub trait DbDestination: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Runs a statement that takes no parameters and returns no rows.
    async fn execute(&self, sql: &str) -> Result<(), DbError>;

    /// Runs an insert and returns the number of rows the backend reports as
    /// affected.
    async fn insert(&self, insert: &Insert) -> Result<u64, DbError>;

    async fn begin(&self) -> Result<(), DbError> {
        let sql = self.dialect().begin_transaction();
        self.execute(&sql).await
    }

    async fn commit(&self) -> Result<(), DbError> {
        let sql = self.dialect().commit_transaction();
        self.execute(&sql).await
    }

    async fn rollback(&self) -> Result<(), DbError> {
        let sql = self.dialect().rollback_transaction();
        self.execute(&sql).await
    }

    async fn savepoint(&self, name: &str) -> Result<(), DbError> {
        let sql = self.dialect().savepoint(name);
        self.execute(&sql).await
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<(), DbError> {
        let sql = self.dialect().rollback_to_savepoint(name);
        self.execute(&sql).await
    }

    async fn release_savepoint(&self, name: &str) -> Result<(), DbError> {
        match self.dialect().release_savepoint(name) {
            Some(sql) => self.execute(&sql).await,
            None => Ok(()),
        }
    }
}
