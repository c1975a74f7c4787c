use crate::error::ConfigError;
use model::execution::conflict::ConflictPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 5_000;
pub const MAX_CHUNK_SIZE: usize = 200_000;

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Rows per batch, and per destination transaction.
    pub chunk_size: usize,
    pub conflict_policy: ConflictPolicy,
    /// Replace values that cannot be coerced to the column's type with null
    /// instead of passing them through for the database to judge.
    pub coerce_invalid_to_null: bool,
    /// Reject failing rows and keep going instead of aborting the run.
    pub continue_on_error: bool,
    /// Upper bound on any single destination statement or source fetch.
    pub statement_timeout_secs: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            conflict_policy: ConflictPolicy::default(),
            coerce_invalid_to_null: true,
            continue_on_error: true,
            statement_timeout_secs: None,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidSetting {
                name: "chunk_size",
                detail: format!("{} is outside 1..={MAX_CHUNK_SIZE}", self.chunk_size),
            });
        }
        if self.statement_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidSetting {
                name: "statement_timeout_secs",
                detail: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }
}
