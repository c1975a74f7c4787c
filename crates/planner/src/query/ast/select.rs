//! Defines the AST for the single-table SELECT the engine issues.

use crate::query::ast::{common::TableRef, expr::Expr};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Select {
    /// The list of columns or expressions to be returned.
    pub columns: Vec<Expr>,

    pub from: TableRef,

    /// Row cap, rendered as `TOP` or `LIMIT` depending on the dialect.
    pub limit: Option<u64>,
}

impl Select {
    /// First `limit` rows of every column of `table`.
    pub fn preview(table: TableRef, limit: u64) -> Self {
        Select {
            columns: vec![Expr::Wildcard],
            from: table,
            limit: Some(limit),
        }
    }
}
