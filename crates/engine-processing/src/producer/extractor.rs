use crate::error::ProcessingError;
use connectors::sql::base::{
    error::DbError,
    source::{BatchReceiver, ChunkResult, RowSource},
};
use model::{
    records::batch::Batch,
    transform::mapping::{ColumnMapping, SourceExpr},
};
use planner::query::{
    ast::{common::TableRef, expr::Expr, select::Select},
    ident,
};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Forward-only producer of batches over one source cursor.
///
/// The cursor runs on its own task and hands over chunks through a channel
/// that holds at most one chunk, so the source never gets more than a batch
/// ahead of the writer.
pub struct RowExtractor {
    rx: BatchReceiver,
    seq: u64,
    rows_read: u64,
    timeout: Option<Duration>,
    exhausted: bool,
}

impl RowExtractor {
    /// Projection of `mapping` over `table`: every resolved expression aliased
    /// to its destination column, in destination order.
    pub fn select_for(table: &TableRef, mapping: &ColumnMapping) -> Select {
        let columns = mapping
            .columns()
            .iter()
            .map(|column| {
                let expr = match &column.source {
                    SourceExpr::ColumnRef(name) => ident(name),
                    SourceExpr::StringLiteral(text) => Expr::StringLiteral(text.clone()),
                    SourceExpr::NullLiteral => Expr::Null,
                };
                expr.aliased(column.destination.clone())
            })
            .collect();

        Select {
            columns,
            from: table.clone(),
            limit: None,
        }
    }

    /// Starts streaming the projection of `mapping` from a database table.
    pub fn from_source(
        source: &dyn RowSource,
        table: &TableRef,
        mapping: &ColumnMapping,
        chunk_size: usize,
    ) -> Self {
        let select = Self::select_for(table, mapping);
        info!(
            table = %table,
            columns = mapping.len(),
            chunk_size,
            dialect = %source.dialect().name(),
            "Starting source stream"
        );
        Self::from_receiver(source.stream(&select, chunk_size))
    }

    /// Wraps an already running stream, e.g. a file source projected through
    /// the mapping.
    pub fn from_receiver(rx: BatchReceiver) -> Self {
        Self {
            rx,
            seq: 0,
            rows_read: 0,
            timeout: None,
            exhausted: false,
        }
    }

    /// Bounds the wait for each chunk.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Next batch in backend order, or `None` once the stream is exhausted.
    /// A source failure is returned once; the extractor is exhausted after it.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, ProcessingError> {
        while !self.exhausted {
            let next = self.receive().await;
            let chunk = match next {
                Ok(Some(Ok(rows))) => rows,
                Ok(Some(Err(err))) | Err(err) => {
                    self.exhausted = true;
                    self.rx.close();
                    return Err(ProcessingError::Extraction {
                        batch: self.seq + 1,
                        source: err,
                    });
                }
                Ok(None) => {
                    self.exhausted = true;
                    debug!(batches = self.seq, rows = self.rows_read, "Source stream exhausted");
                    break;
                }
            };

            if chunk.is_empty() {
                continue;
            }

            self.seq += 1;
            self.rows_read += chunk.len() as u64;
            return Ok(Some(Batch::new(self.seq, chunk)));
        }
        Ok(None)
    }

    /// Batches handed out so far.
    pub fn batches_read(&self) -> u64 {
        self.seq
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    async fn receive(&mut self) -> Result<Option<ChunkResult>, DbError> {
        match self.timeout {
            Some(limit) => timeout(limit, self.rx.recv())
                .await
                .map_err(|_| DbError::Timeout(limit)),
            None => Ok(self.rx.recv().await),
        }
    }
}
