use chrono::{DateTime, Utc};
use engine_processing::{
    consumer::writer::{BatchOutcome, ConflictAwareWriter},
    error::ProcessingError,
    producer::extractor::RowExtractor,
    transform::normalizer::Normalizer,
};
use model::execution::{counters::RunCounters, rejected_row::RejectedRow};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The source was drained.
    Completed,
    /// Stopped at a batch boundary on request.
    Cancelled,
}

/// Snapshot published after every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub batches: u64,
    pub counters: RunCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub batches: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    #[serde(skip)]
    pub rejected_rows: Vec<RejectedRow>,
    /// Where the rejects were exported, when there were any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejects_path: Option<PathBuf>,
}

/// A run that stopped on a fatal error, with everything settled before it.
#[derive(Debug, Error)]
#[error("Run aborted in batch {}: {error}", error.batch())]
pub struct RunFailure {
    #[source]
    pub error: ProcessingError,
    pub run_id: Uuid,
    /// `fetched` includes the rows of the aborted batch; the other counters
    /// only cover committed batches.
    pub counters: RunCounters,
    pub batches: u64,
    pub rejected_rows: Vec<RejectedRow>,
    pub rejects_path: Option<PathBuf>,
}

/// Everything one run accumulates. Owned by the controller and dropped with
/// the run.
#[derive(Debug, Default)]
pub struct RunState {
    pub counters: RunCounters,
    pub rejected: Vec<RejectedRow>,
    pub batches: u64,
}

impl RunState {
    fn apply(&mut self, outcome: BatchOutcome) {
        // `fetched` is counted when the batch is pulled.
        let RunCounters {
            inserted_or_upserted,
            duplicates_skipped,
            rejected,
            ..
        } = outcome.counters;
        self.counters.inserted_or_upserted += inserted_or_upserted;
        self.counters.duplicates_skipped += duplicates_skipped;
        self.counters.rejected += rejected;
        self.rejected.extend(outcome.rejected);
        self.batches += 1;
    }

    fn progress(&self) -> RunProgress {
        RunProgress {
            batches: self.batches,
            counters: self.counters,
        }
    }
}

/// Drives extract → normalize → write one batch at a time.
pub struct RunController {
    run_id: Uuid,
    cancel: CancellationToken,
    progress: Option<watch::Sender<RunProgress>>,
}

impl RunController {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: watch::Sender<RunProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn run(
        &self,
        extractor: &mut RowExtractor,
        normalizer: &Normalizer,
        writer: &ConflictAwareWriter,
    ) -> Result<RunReport, Box<RunFailure>> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = RunState::default();
        info!(run_id = %self.run_id, "Run started");

        let status = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break RunStatus::Cancelled,
                next = extractor.next_batch() => next,
            };

            let batch = match next {
                Ok(Some(batch)) => batch,
                Ok(None) => break RunStatus::Completed,
                Err(err) => return Err(self.fail(err, state)),
            };

            state.counters.fetched += batch.len() as u64;
            let batch = normalizer.normalize(batch);
            match writer.write_batch(&batch).await {
                Ok(outcome) => state.apply(outcome),
                Err(err) => return Err(self.fail(err, state)),
            }

            if let Some(progress) = &self.progress {
                progress.send_replace(state.progress());
            }
        };

        let duration = start.elapsed();
        info!(
            run_id = %self.run_id,
            status = ?status,
            batches = state.batches,
            fetched = state.counters.fetched,
            inserted = state.counters.inserted_or_upserted,
            duplicates = state.counters.duplicates_skipped,
            rejected = state.counters.rejected,
            duration_ms = duration.as_millis(),
            "Run finished"
        );

        Ok(RunReport {
            run_id: self.run_id,
            status,
            counters: state.counters,
            batches: state.batches,
            started_at,
            duration_ms: duration.as_millis(),
            rejected_rows: state.rejected,
            rejects_path: None,
        })
    }

    fn fail(&self, error: ProcessingError, state: RunState) -> Box<RunFailure> {
        warn!(
            run_id = %self.run_id,
            batch = error.batch(),
            fetched = state.counters.fetched,
            error = %error,
            "Run aborted"
        );
        Box::new(RunFailure {
            error,
            run_id: self.run_id,
            counters: state.counters,
            batches: state.batches,
            rejected_rows: state.rejected,
            rejects_path: None,
        })
    }
}
