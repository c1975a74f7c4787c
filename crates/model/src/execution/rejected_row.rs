use crate::records::row::RowData;
use serde::{Deserialize, Serialize};

/// Reason recorded for a unique or primary key violation.
pub const CONFLICT_REASON: &str = "conflict";

/// A row that could not be written, kept with the reason for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// The row as it was submitted to the destination.
    original_values: RowData,
    reason: String,
}

impl RejectedRow {
    pub fn new(original_values: RowData, reason: impl Into<String>) -> Self {
        Self {
            original_values,
            reason: reason.into(),
        }
    }

    pub fn conflict(original_values: RowData) -> Self {
        Self::new(original_values, CONFLICT_REASON)
    }

    pub fn original_values(&self) -> &RowData {
        &self.original_values
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_conflict(&self) -> bool {
        self.reason == CONFLICT_REASON
    }
}
