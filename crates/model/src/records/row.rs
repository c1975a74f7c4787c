use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One row record with ordered, named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(field_values: Vec<FieldValue>) -> Self {
        RowData { field_values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        RowData {
            field_values: pairs
                .into_iter()
                .map(|(k, v)| FieldValue::new(k, v))
                .collect(),
        }
    }

    /// Exact name match first, then case-insensitive.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name == field)
            .or_else(|| {
                self.field_values
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(field))
            })
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.field_values.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_exact_then_case_insensitive() {
        let row = RowData::from_pairs([("Id", Value::Int(1)), ("id", Value::Int(2))]);
        assert_eq!(row.get_value("id"), Value::Int(2));
        assert_eq!(row.get_value("ID"), Value::Int(1));
        assert_eq!(row.get_value("missing"), Value::Null);
    }
}
