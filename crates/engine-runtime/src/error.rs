use crate::execution::controller::RunFailure;
use connectors::{error::AdapterError, file::csv::error::FileError, sql::base::error::DbError};
use engine_config::error::ConfigError;
use model::transform::mapping::MappingError;
use thiserror::Error;

/// Top-level errors for one migration.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: AdapterError,
    },

    #[error("Failed to read metadata of {table}: {source}")]
    Metadata {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Table {0} does not exist or has no visible columns")]
    TableNotFound(String),

    #[error("Invalid mapping: {0}")]
    Mapping(#[from] MappingError),

    #[error("File source error: {0}")]
    File(#[from] FileError),

    /// The run started and stopped on a fatal error. Carries the partial
    /// counters and the rows rejected so far.
    #[error(transparent)]
    Run(#[from] Box<RunFailure>),
}
