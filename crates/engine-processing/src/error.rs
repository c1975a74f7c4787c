use connectors::sql::base::error::DbError;
use thiserror::Error;

/// Fatal failures of the per-batch pipeline. Anything that reaches the caller
/// as a `ProcessingError` ends the run.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to read batch {batch} from source: {source}")]
    Extraction {
        batch: u64,
        #[source]
        source: DbError,
    },

    #[error("Unique violation in batch {batch}: {source}")]
    Conflict {
        batch: u64,
        #[source]
        source: DbError,
    },

    #[error("Failed to write batch {batch} to '{table}': {source}")]
    Write {
        batch: u64,
        table: String,
        #[source]
        source: DbError,
    },
}

impl ProcessingError {
    pub fn batch(&self) -> u64 {
        match self {
            ProcessingError::Extraction { batch, .. }
            | ProcessingError::Conflict { batch, .. }
            | ProcessingError::Write { batch, .. } => *batch,
        }
    }
}
