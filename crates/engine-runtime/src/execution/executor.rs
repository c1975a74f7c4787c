use crate::{
    error::RuntimeError,
    execution::{
        controller::{RunController, RunProgress, RunReport},
        plan::{DestinationHandle, RunPlan, SourceHandle},
    },
    report::rejects::write_rejects_csv,
    retry::{RetryPolicy, connect_with_retry},
};
use connectors::{
    adapter::Adapter, file::csv::source::CsvSource, sql::base::metadata::TableMetadata,
};
use engine_config::migration::{
    MigrationConfig,
    endpoint::{SourceSpec, TableEndpoint},
    mapping::MappingSpec,
};
use model::{execution::rejected_row::RejectedRow, transform::mapping::auto_map};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs one configured migration end to end: connect, introspect, resolve
/// the mapping, stream, export rejects.
pub struct MigrationExecutor {
    config: MigrationConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
    progress: Option<watch::Sender<RunProgress>>,
}

impl MigrationExecutor {
    pub fn new(config: MigrationConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            retry: RetryPolicy::default(),
            cancel,
            progress: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: watch::Sender<RunProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn execute(&self) -> Result<RunReport, RuntimeError> {
        info!(
            source = %self.config.source,
            destination = %self.config.destination,
            "Starting migration"
        );

        let destination = self.open_destination().await?;
        let source = self.open_source().await?;
        let raw = self.config.mapping.as_ref().map(MappingSpec::to_raw);
        let plan = RunPlan::build(&source, &destination, raw, &self.config.settings)?;

        let mut controller = RunController::new(self.cancel.clone());
        if let Some(progress) = &self.progress {
            controller = controller.with_progress(progress.clone());
        }

        let mut extractor = plan.extractor(&source);
        let rejects_path = self.config.rejects_path();
        match controller
            .run(&mut extractor, &plan.normalizer, &plan.writer)
            .await
        {
            Ok(mut report) => {
                report.rejects_path = export_rejects(&rejects_path, &report.rejected_rows);
                Ok(report)
            }
            Err(mut failure) => {
                failure.rejects_path = export_rejects(&rejects_path, &failure.rejected_rows);
                Err(RuntimeError::Run(failure))
            }
        }
    }

    /// Same-name mapping between the configured source and destination,
    /// for review before a run.
    pub async fn propose_mapping(&self) -> Result<MappingSpec, RuntimeError> {
        let destination = self.open_destination().await?;
        let source = self.open_source().await?;
        let raw = auto_map(&destination.metadata.column_names(), source.columns());
        Ok(MappingSpec::from(raw))
    }

    async fn open_destination(&self) -> Result<DestinationHandle, RuntimeError> {
        let endpoint = &self.config.destination;
        let adapter = connect(&self.retry, endpoint).await?;
        let metadata = table_metadata(&adapter, endpoint).await?;
        Ok(DestinationHandle {
            destination: adapter.destination(),
            metadata,
        })
    }

    async fn open_source(&self) -> Result<SourceHandle, RuntimeError> {
        match &self.config.source {
            SourceSpec::Database(endpoint) => {
                let adapter = connect(&self.retry, endpoint).await?;
                let metadata = table_metadata(&adapter, endpoint).await?;
                Ok(SourceHandle::Table {
                    source: adapter.row_source(),
                    columns: metadata.column_names(),
                    table: metadata.table,
                })
            }
            SourceSpec::File(file) => {
                let csv = CsvSource::open(&file.path, file.csv.clone())?;
                info!(path = %file.path.display(), columns = csv.headers().len(), "Opened file source");
                Ok(SourceHandle::File(csv))
            }
        }
    }
}

pub async fn connect(retry: &RetryPolicy, endpoint: &TableEndpoint) -> Result<Adapter, RuntimeError> {
    connect_with_retry(retry, endpoint.kind, &endpoint.connection)
        .await
        .map_err(|source| RuntimeError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })
}

/// Column and key metadata of the endpoint's table. A table without visible
/// columns is treated as missing.
pub async fn table_metadata(
    adapter: &Adapter,
    endpoint: &TableEndpoint,
) -> Result<TableMetadata, RuntimeError> {
    let table = endpoint.table_ref();
    let metadata = adapter
        .get_sql()
        .table_metadata(&table)
        .await
        .map_err(|source| RuntimeError::Metadata {
            table: table.to_string(),
            source,
        })?;
    if metadata.columns.is_empty() {
        return Err(RuntimeError::TableNotFound(table.to_string()));
    }
    Ok(metadata)
}

/// Path of the written rejects file. A file that cannot be written is logged
/// and leaves the run's outcome untouched.
fn export_rejects(path: &Path, rows: &[RejectedRow]) -> Option<PathBuf> {
    match write_rejects_csv(path, rows) {
        Ok(written) => written.then(|| path.to_path_buf()),
        Err(err) => {
            warn!(
                path = %path.display(),
                rows = rows.len(),
                error = %err,
                "Could not export rejected rows"
            );
            None
        }
    }
}
