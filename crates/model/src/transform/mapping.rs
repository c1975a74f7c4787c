use crate::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("mapping is empty: no destination column has a source expression")]
    EmptyMapping,

    #[error("destination column '{destination}' refers to unknown source column '{column}'")]
    MissingSourceColumn { destination: String, column: String },

    #[error("'{0}' is not a column of the destination table")]
    UnknownDestinationColumn(String),

    #[error("destination column '{0}' is mapped more than once")]
    DuplicateDestinationColumn(String),
}

/// What feeds one destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceExpr {
    ColumnRef(String),
    NullLiteral,
    StringLiteral(String),
}

impl SourceExpr {
    /// Value this expression takes for a given source row.
    pub fn evaluate(&self, row: &RowData) -> Value {
        match self {
            SourceExpr::ColumnRef(name) => row.get_value(name),
            SourceExpr::NullLiteral => Value::Null,
            SourceExpr::StringLiteral(text) => Value::String(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub destination: String,
    pub source: SourceExpr,
}

/// Validated destination column → source expression table, in destination
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    /// Validates a raw `(destination, expression)` table.
    ///
    /// Empty expressions drop the column from the mapping. `NULL` (any case)
    /// becomes a null literal, `'text'` a string literal, and anything else must
    /// name a source column.
    pub fn resolve<D, S>(
        raw: &[(String, String)],
        destination_columns: &[D],
        source_columns: &[S],
    ) -> Result<Self, MappingError>
    where
        D: AsRef<str>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut resolved: Vec<(usize, MappedColumn)> = Vec::with_capacity(raw.len());

        for (destination, expr) in raw {
            let position = find_column(destination_columns, destination)
                .ok_or_else(|| MappingError::UnknownDestinationColumn(destination.clone()))?;
            let canonical = destination_columns[position].as_ref().to_string();

            if !seen.insert(position) {
                return Err(MappingError::DuplicateDestinationColumn(canonical));
            }

            let Some(source) = classify_expression(expr, &canonical, source_columns)? else {
                continue;
            };
            resolved.push((
                position,
                MappedColumn {
                    destination: canonical,
                    source,
                },
            ));
        }

        if resolved.is_empty() {
            return Err(MappingError::EmptyMapping);
        }

        resolved.sort_by_key(|(position, _)| *position);
        Ok(ColumnMapping {
            columns: resolved.into_iter().map(|(_, c)| c).collect(),
        })
    }

    pub fn columns(&self) -> &[MappedColumn] {
        &self.columns
    }

    pub fn destination_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.destination.clone()).collect()
    }

    /// Source columns read by this mapping, without duplicates.
    pub fn referenced_source_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .filter_map(|c| match &c.source {
                SourceExpr::ColumnRef(name) if seen.insert(name.as_str()) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Applies the mapping to a source row, producing a row keyed by
    /// destination column names.
    pub fn project(&self, row: &RowData) -> RowData {
        RowData::new(
            self.columns
                .iter()
                .map(|c| FieldValue::new(c.destination.clone(), c.source.evaluate(row)))
                .collect(),
        )
    }
}

/// Proposes a raw mapping pairing every destination column with the source
/// column of the same name (case-insensitive). Unmatched destination columns
/// get an empty expression.
pub fn auto_map<D, S>(destination_columns: &[D], source_columns: &[S]) -> Vec<(String, String)>
where
    D: AsRef<str>,
    S: AsRef<str>,
{
    destination_columns
        .iter()
        .map(|d| {
            let source = find_column(source_columns, d.as_ref())
                .map(|i| source_columns[i].as_ref().to_string())
                .unwrap_or_default();
            (d.as_ref().to_string(), source)
        })
        .collect()
}

fn classify_expression<S: AsRef<str>>(
    expr: &str,
    destination: &str,
    source_columns: &[S],
) -> Result<Option<SourceExpr>, MappingError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }
    if expr.eq_ignore_ascii_case("null") {
        return Ok(Some(SourceExpr::NullLiteral));
    }
    if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
        return Ok(Some(SourceExpr::StringLiteral(expr[1..expr.len() - 1].to_string())));
    }

    match find_column(source_columns, expr) {
        Some(i) => Ok(Some(SourceExpr::ColumnRef(source_columns[i].as_ref().to_string()))),
        None => Err(MappingError::MissingSourceColumn {
            destination: destination.to_string(),
            column: expr.to_string(),
        }),
    }
}

fn find_column<S: AsRef<str>>(columns: &[S], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.as_ref() == name)
        .or_else(|| columns.iter().position(|c| c.as_ref().eq_ignore_ascii_case(name)))
}
