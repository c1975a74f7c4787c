use crate::memory::{MemoryDestination, MemorySource};
use connectors::sql::base::{destination::DbDestination, source::RowSource};
use engine_config::settings::RunSettings;
use engine_runtime::{
    error::RuntimeError,
    execution::{
        controller::{RunController, RunReport},
        plan::{DestinationHandle, RunPlan, SourceHandle},
    },
};
use model::{core::value::Value, execution::conflict::ConflictPolicy, records::row::RowData};
use planner::query::dialect::DatabaseKind;
use std::sync::Arc;

pub const SOURCE_COLUMNS: [&str; 4] = ["cust_id", "full_name", "is_active", "balance"];

pub const DESTINATION_COLUMNS: [(&str, &str); 4] = [
    ("id", "integer"),
    ("name", "character varying(100)"),
    ("active", "boolean"),
    ("balance", "numeric(12,2)"),
];

/// Source rows with ids `1..=count`. Flags and balances arrive as text.
pub fn customer_rows(count: i64) -> Vec<RowData> {
    (1..=count)
        .map(|id| {
            RowData::from_pairs([
                ("cust_id", Value::Int(id)),
                ("full_name", Value::String(format!("Customer {id}"))),
                (
                    "is_active",
                    Value::String(if id % 2 == 0 { "yes" } else { "no" }.into()),
                ),
                ("balance", Value::String(format!("{id}.50"))),
            ])
        })
        .collect()
}

/// A destination row as the run would write it.
pub fn customer_row(id: i64) -> RowData {
    RowData::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::String(format!("Customer {id}"))),
        ("active", Value::Boolean(id % 2 == 0)),
        (
            "balance",
            Value::Decimal(format!("{id}.50").parse().expect("decimal literal")),
        ),
    ])
}

pub fn customers_source(count: i64) -> MemorySource {
    MemorySource::new("customers", &SOURCE_COLUMNS, customer_rows(count))
}

pub fn customers_destination(kind: DatabaseKind) -> Arc<MemoryDestination> {
    MemoryDestination::new(kind, "customers", &DESTINATION_COLUMNS, &["id"])
}

pub fn customer_mapping() -> Vec<(String, String)> {
    [
        ("id", "cust_id"),
        ("name", "full_name"),
        ("active", "is_active"),
        ("balance", "balance"),
    ]
    .into_iter()
    .map(|(d, s)| (d.to_string(), s.to_string()))
    .collect()
}

pub fn settings(chunk_size: usize, policy: ConflictPolicy, continue_on_error: bool) -> RunSettings {
    RunSettings {
        chunk_size,
        conflict_policy: policy,
        continue_on_error,
        ..RunSettings::default()
    }
}

pub fn table_handle(source: &Arc<MemorySource>) -> SourceHandle {
    SourceHandle::Table {
        source: Arc::clone(source) as Arc<dyn RowSource>,
        table: source.table().clone(),
        columns: source.columns().to_vec(),
    }
}

pub fn destination_handle(destination: &Arc<MemoryDestination>) -> DestinationHandle {
    DestinationHandle {
        destination: Arc::clone(destination) as Arc<dyn DbDestination>,
        metadata: destination.metadata(),
    }
}

/// Plans and runs one migration between in-memory tables.
pub async fn run_with(
    controller: &RunController,
    source: &SourceHandle,
    destination: &Arc<MemoryDestination>,
    raw: Option<Vec<(String, String)>>,
    settings: &RunSettings,
) -> Result<RunReport, RuntimeError> {
    let plan = RunPlan::build(source, &destination_handle(destination), raw, settings)?;
    let mut extractor = plan.extractor(source);
    let report = controller
        .run(&mut extractor, &plan.normalizer, &plan.writer)
        .await?;
    Ok(report)
}

/// Destination rows ordered by `id`.
pub fn rows_by_id(destination: &MemoryDestination) -> Vec<RowData> {
    let mut rows = destination.rows();
    rows.sort_by_key(|row| row.get_value("id").as_i64());
    rows
}
