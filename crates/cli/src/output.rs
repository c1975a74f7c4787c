use crate::error::CliError;
use connectors::sql::base::metadata::TableMetadata;
use engine_runtime::execution::controller::{RunFailure, RunReport};
use model::{core::value::Value, records::row::RowData};
use serde::Serialize;
use serde_json::{Map, Value as Json, json};
use std::path::Path;

pub async fn emit_report(report: &RunReport, path: Option<&Path>) -> Result<(), CliError> {
    emit(&serde_json::to_value(report)?, path).await
}

pub async fn emit_failure(failure: &RunFailure, path: Option<&Path>) -> Result<(), CliError> {
    let body = json!({
        "run_id": failure.run_id,
        "status": "aborted",
        "error": failure.to_string(),
        "batches": failure.batches,
        "counters": failure.counters,
        "rejects_path": failure.rejects_path,
    });
    emit(&body, path).await
}

/// Pretty JSON to `path`, or stdout when there is none.
async fn emit(body: &Json, path: Option<&Path>) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(body)?;
    match path {
        Some(path) => tokio::fs::write(path, text).await?,
        None => println!("{text}"),
    }
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Rows as a JSON array of objects, in column order.
pub fn print_rows(rows: &[RowData]) -> Result<(), CliError> {
    let rows: Vec<Json> = rows
        .iter()
        .map(|row| {
            let object: Map<String, Json> = row
                .field_values
                .iter()
                .map(|f| (f.name.clone(), to_json(&f.value)))
                .collect();
            Json::Object(object)
        })
        .collect();
    print_json(&rows)
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Boolean(b) => json!(b),
        Value::Json(j) => j.clone(),
        other => other.to_text().map(Json::String).unwrap_or(Json::Null),
    }
}

pub fn print_columns(metadata: &TableMetadata) {
    let width = metadata
        .columns
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("COLUMN".len());

    println!("Table {}", metadata.table);
    println!("{:<width$}  {:<28}  {:<10}  KEY", "COLUMN", "TYPE", "CLASS");
    for column in &metadata.columns {
        let key = if metadata.is_key(&column.name) { "yes" } else { "" };
        println!(
            "{:<width$}  {:<28}  {:<10}  {key}",
            column.name,
            column.data_type,
            column.type_class().to_string()
        );
    }
}
