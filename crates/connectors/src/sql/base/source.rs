use crate::sql::base::error::DbError;
use model::records::row::RowData;
use planner::query::{ast::select::Select, dialect::Dialect};
use tokio::sync::mpsc;

/// Chunks in flight between a streaming cursor and its consumer. One queued
/// chunk keeps the producer a step ahead without letting it run away.
pub const STREAM_BUFFER: usize = 1;

pub type ChunkResult = Result<Vec<RowData>, DbError>;
pub type BatchReceiver = mpsc::Receiver<ChunkResult>;

/// A source that can run a projection and stream its rows in bounded chunks.
pub trait RowSource: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Starts streaming `select`. Chunks hold at most `chunk_size` rows and
    /// arrive in backend order; the channel closes at end of stream. A failure
    /// is delivered as the last item.
    fn stream(&self, select: &Select, chunk_size: usize) -> BatchReceiver;
}

/// Groups rows from a cursor into chunks and hands them to the channel.
pub struct ChunkSender {
    tx: mpsc::Sender<ChunkResult>,
    chunk_size: usize,
    buffer: Vec<RowData>,
}

impl ChunkSender {
    pub fn channel(chunk_size: usize) -> (Self, BatchReceiver) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (Self::new(tx, chunk_size), rx)
    }

    pub fn new(tx: mpsc::Sender<ChunkResult>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
        }
    }

    /// Returns `false` once the receiver has gone away.
    pub async fn push(&mut self, row: RowData) -> bool {
        self.buffer.push(row);
        if self.buffer.len() >= self.chunk_size {
            self.flush().await
        } else {
            true
        }
    }

    /// Blocking flavour of [`ChunkSender::push`] for use on blocking threads.
    pub fn push_blocking(&mut self, row: RowData) -> bool {
        self.buffer.push(row);
        if self.buffer.len() >= self.chunk_size {
            let chunk = self.take();
            self.tx.blocking_send(Ok(chunk)).is_ok()
        } else {
            true
        }
    }

    pub async fn finish(mut self, outcome: Result<(), DbError>) {
        let _ = match outcome {
            Ok(()) => self.flush().await,
            Err(err) => self.tx.send(Err(err)).await.is_ok(),
        };
    }

    pub fn finish_blocking(mut self, outcome: Result<(), DbError>) {
        let _ = match outcome {
            Ok(()) if self.buffer.is_empty() => Ok(()),
            Ok(()) => {
                let chunk = self.take();
                self.tx.blocking_send(Ok(chunk))
            }
            Err(err) => self.tx.blocking_send(Err(err)),
        };
    }

    async fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        let chunk = self.take();
        self.tx.send(Ok(chunk)).await.is_ok()
    }

    fn take(&mut self) -> Vec<RowData> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size))
    }
}
