//! Defines the AST for an INSERT statement.

use crate::query::ast::{common::TableRef, expr::Expr};

/// A multi-row `INSERT ... VALUES` statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    /// The rows of values to be inserted. Each inner vector represents a single row.
    pub values: Vec<Vec<Expr>>,
    /// Optional conflict handling, rendered by the dialect.
    pub on_conflict: Option<OnConflict>,
}

impl Insert {
    pub fn param_count(&self) -> usize {
        self.values.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Key columns the conflict is detected on.
    pub columns: Vec<String>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate {
        assignments: Vec<ConflictAssignment>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictAssignment {
    pub column: String,
    pub value: Expr,
}
