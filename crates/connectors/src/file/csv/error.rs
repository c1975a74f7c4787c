use thiserror::Error;

/// Failures of the delimited-file source.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Source file not found: {0}")]
    NotFound(String),
    /// Unusable delimiter or missing header line.
    #[error("Invalid source file: {0}")]
    InvalidFormat(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Unreadable record {record}: {detail}")]
    ReadError { record: u64, detail: String },
}
