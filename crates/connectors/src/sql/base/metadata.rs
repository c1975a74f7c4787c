use model::core::type_class::TypeClass;
use planner::query::ast::common::TableRef;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Type as declared by the backend, e.g. `character varying` or `decimal(10,2)`.
    pub data_type: String,
    pub is_nullable: bool,
}

impl ColumnMetadata {
    pub fn type_class(&self) -> TypeClass {
        TypeClass::classify(&self.data_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMetadata {
    pub table: TableRef,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnMetadata>,
    /// Primary key columns, or those of the first unique constraint when the
    /// table has no primary key.
    pub key_columns: Vec<String>,
}

impl TableMetadata {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn type_classes(&self) -> HashMap<String, TypeClass> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.type_class()))
            .collect()
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.key_columns.iter().any(|k| k.eq_ignore_ascii_case(column))
    }
}

/// Picks the key set from `(constraint_name, column)` rows ordered primary key
/// first, then by constraint name and key position.
pub fn pick_key_columns<I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut chosen: Option<String> = None;
    let mut columns = Vec::new();
    for (constraint, column) in rows {
        match &chosen {
            None => chosen = Some(constraint),
            Some(name) if *name != constraint => break,
            Some(_) => {}
        }
        columns.push(column);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(c: &str, col: &str) -> (String, String) {
        (c.to_string(), col.to_string())
    }

    #[test]
    fn first_constraint_wins() {
        let keys = pick_key_columns(vec![
            pair("orders_pkey", "tenant_id"),
            pair("orders_pkey", "order_id"),
            pair("orders_ref_key", "reference"),
        ]);
        assert_eq!(keys, vec!["tenant_id".to_string(), "order_id".to_string()]);
        assert!(pick_key_columns(Vec::new()).is_empty());
    }

    #[test]
    fn classes_follow_declared_types() {
        let meta = TableMetadata {
            table: TableRef::new(Some("public"), "users"),
            columns: vec![
                ColumnMetadata {
                    name: "id".into(),
                    data_type: "bigint".into(),
                    is_nullable: false,
                },
                ColumnMetadata {
                    name: "Active".into(),
                    data_type: "boolean".into(),
                    is_nullable: true,
                },
            ],
            key_columns: vec!["id".into()],
        };
        let classes = meta.type_classes();
        assert_eq!(classes["id"], TypeClass::Integer);
        assert_eq!(classes["Active"], TypeClass::Boolean);
        assert!(meta.is_key("ID"));
        assert_eq!(meta.column("active").map(|c| c.name.as_str()), Some("Active"));
    }
}
