use crate::transform::coerce::coerce;
use model::{
    core::{type_class::TypeClass, value::Value},
    records::{batch::Batch, row::RowData},
};
use std::collections::HashMap;
use tracing::trace;

/// Rewrites every value to the representation its destination column's type
/// class expects.
#[derive(Debug, Clone)]
pub struct Normalizer {
    classes: HashMap<String, TypeClass>,
    coerce_invalid_to_null: bool,
}

impl Normalizer {
    /// `classes` maps destination column names to their type class. Columns
    /// missing from the map pass through untouched.
    pub fn new(classes: HashMap<String, TypeClass>, coerce_invalid_to_null: bool) -> Self {
        let classes = classes
            .into_iter()
            .map(|(name, class)| (name.to_ascii_lowercase(), class))
            .collect();
        Self {
            classes,
            coerce_invalid_to_null,
        }
    }

    pub fn normalize(&self, batch: Batch) -> Batch {
        let rows = batch.rows.into_iter().map(|row| self.normalize_row(row)).collect();
        Batch::new(batch.seq, rows)
    }

    pub fn normalize_row(&self, mut row: RowData) -> RowData {
        for field in &mut row.field_values {
            let class = self.class_of(&field.name);
            let value = std::mem::replace(&mut field.value, Value::Null);
            field.value = self.normalize_value(value, class);
        }
        row
    }

    /// Null stays null. A value the class cannot take becomes null or is
    /// kept as is, depending on `coerce_invalid_to_null`.
    pub fn normalize_value(&self, value: Value, class: TypeClass) -> Value {
        if value.is_null() || class == TypeClass::Opaque {
            return value;
        }
        match coerce(&value, class) {
            Ok(coerced) => coerced,
            Err(err) => {
                trace!(error = %err, "Invalid value");
                if self.coerce_invalid_to_null {
                    Value::Null
                } else {
                    value
                }
            }
        }
    }

    fn class_of(&self, column: &str) -> TypeClass {
        self.classes
            .get(&column.to_ascii_lowercase())
            .copied()
            .unwrap_or(TypeClass::Opaque)
    }
}
