use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid env file {path}: {detail}")]
    EnvFile { path: PathBuf, detail: String },

    #[error("Environment variable '{0}' is not set")]
    UnresolvedVariable(String),

    #[error("Invalid setting '{name}': {detail}")]
    InvalidSetting { name: &'static str, detail: String },
}
