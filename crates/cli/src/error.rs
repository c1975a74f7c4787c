use crate::shutdown::ExitCode;
use connectors::{
    error::AdapterError,
    file::csv::error::FileError,
    sql::base::error::DbError,
};
use engine_config::error::ConfigError;
use engine_runtime::error::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("Connection failed: {0}")]
    Connect(#[from] AdapterError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Runtime(RuntimeError::Run(_)) => ExitCode::RunAborted,
            _ => ExitCode::GeneralError,
        }
    }
}
