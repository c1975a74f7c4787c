use crate::error::RuntimeError;
use connectors::{
    file::csv::source::CsvSource,
    sql::base::{destination::DbDestination, metadata::TableMetadata, source::RowSource},
};
use engine_config::settings::RunSettings;
use engine_processing::{
    consumer::writer::{ConflictAwareWriter, WriterOptions},
    producer::extractor::RowExtractor,
    transform::normalizer::Normalizer,
};
use model::transform::mapping::{ColumnMapping, auto_map};
use planner::query::ast::common::TableRef;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// Where rows come from.
pub enum SourceHandle {
    Table {
        source: Arc<dyn RowSource>,
        table: TableRef,
        columns: Vec<String>,
    },
    File(CsvSource),
}

impl SourceHandle {
    pub fn columns(&self) -> &[String] {
        match self {
            SourceHandle::Table { columns, .. } => columns,
            SourceHandle::File(csv) => csv.headers(),
        }
    }
}

/// Where rows go.
pub struct DestinationHandle {
    pub destination: Arc<dyn DbDestination>,
    pub metadata: TableMetadata,
}

/// A validated run: mapping resolved against both sides, writer and
/// normalizer configured. Building one performs no I/O.
pub struct RunPlan {
    pub mapping: ColumnMapping,
    pub normalizer: Normalizer,
    pub writer: ConflictAwareWriter,
    settings: RunSettings,
}

impl RunPlan {
    /// Resolves `raw` (or, when absent, a same-name mapping) and prepares the
    /// pipeline stages. Fails on an invalid mapping before the source is
    /// queried.
    pub fn build(
        source: &SourceHandle,
        destination: &DestinationHandle,
        raw: Option<Vec<(String, String)>>,
        settings: &RunSettings,
    ) -> Result<Self, RuntimeError> {
        let destination_columns = destination.metadata.column_names();
        let raw = match raw {
            Some(raw) => raw,
            None => {
                debug!("No mapping given, pairing columns by name");
                auto_map(&destination_columns, source.columns())
            }
        };
        let mapping = ColumnMapping::resolve(&raw, &destination_columns, source.columns())?;

        let classes: HashMap<_, _> = destination
            .metadata
            .type_classes()
            .into_iter()
            .filter(|(name, _)| mapping.columns().iter().any(|c| c.destination == *name))
            .collect();
        let normalizer = Normalizer::new(classes, settings.coerce_invalid_to_null);

        let writer = ConflictAwareWriter::new(
            Arc::clone(&destination.destination),
            destination.metadata.table.clone(),
            mapping.destination_columns(),
            &destination.metadata.key_columns,
            WriterOptions {
                policy: settings.conflict_policy,
                continue_on_error: settings.continue_on_error,
                statement_timeout: settings.statement_timeout(),
            },
        );

        info!(
            table = %destination.metadata.table,
            columns = mapping.len(),
            policy = %settings.conflict_policy,
            chunk_size = settings.chunk_size,
            "Run planned"
        );

        Ok(Self {
            mapping,
            normalizer,
            writer,
            settings: settings.clone(),
        })
    }

    /// Starts the source stream.
    pub fn extractor(&self, source: &SourceHandle) -> RowExtractor {
        let chunk_size = self.settings.chunk_size;
        let extractor = match source {
            SourceHandle::Table { source, table, .. } => {
                RowExtractor::from_source(source.as_ref(), table, &self.mapping, chunk_size)
            }
            SourceHandle::File(csv) => {
                RowExtractor::from_receiver(csv.stream(&self.mapping, chunk_size))
            }
        };
        extractor.with_timeout(self.settings.statement_timeout())
    }
}
