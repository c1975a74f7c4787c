use crate::{
    file::csv::error::FileError,
    sql::base::error::{ConnectorError, DbError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Failed to open a database connection.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// File-related error.
    #[error("File error: {0}")]
    FileError(#[from] FileError),

    /// Database-related error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl AdapterError {
    /// True when retrying the connection may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Connector(err) if err.is_transient())
    }
}
