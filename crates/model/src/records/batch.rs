use crate::records::row::RowData;

/// A bounded slice of the row stream. Produced by the extractor, consumed by
/// the normalizer and writer, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Sequence number within the run, starting at 1.
    pub seq: u64,
    pub rows: Vec<RowData>,
}

impl Batch {
    pub fn new(seq: u64, rows: Vec<RowData>) -> Self {
        Batch { seq, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
