//! Defines the `Dialect` trait for database-specific SQL syntax.

use crate::query::ast::{
    common::TableRef,
    expr::Expr,
    insert::{ConflictAction, ConflictAssignment, OnConflict},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[serde(alias = "pg", alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "sqlserver")]
    MsSql,
}

impl DatabaseKind {
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DatabaseKind::Postgres => &Postgres,
            DatabaseKind::MySql => &MySql,
            DatabaseKind::MsSql => &MsSql,
        }
    }

    /// Schema assumed when a table reference names none.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            DatabaseKind::Postgres => Some("public"),
            DatabaseKind::MsSql => Some("dbo"),
            DatabaseKind::MySql => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::Postgres => 5432,
            DatabaseKind::MySql => 3306,
            DatabaseKind::MsSql => 1433,
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Postgres => write!(f, "postgres"),
            DatabaseKind::MySql => write!(f, "mysql"),
            DatabaseKind::MsSql => write!(f, "mssql"),
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
            "mssql" | "sqlserver" | "sql_server" => Ok(DatabaseKind::MsSql),
            other => Err(format!("unsupported database kind: {other}")),
        }
    }
}

/// A conflict clause the backend cannot express.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnsupportedCapability {
    #[error("{backend} has no native ignore-on-conflict insert")]
    SkipDuplicates { backend: String },

    #[error("{backend} has no native update-on-conflict insert")]
    Upsert { backend: String },

    #[error("no primary or unique key columns are mapped")]
    MissingKeySet,
}

pub trait Dialect: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Wraps an identifier in the dialect's quotation marks, doubling any
    /// embedded closing quote.
    ///
    /// - PostgreSQL: `"my_column"`
    /// - MySQL: `` `my_column` ``
    /// - SQL Server: `[my_column]`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for the zero-based parameter `index`.
    fn get_placeholder(&self, index: usize) -> String;

    /// Largest number of bind parameters a single statement may carry.
    fn max_bind_params(&self) -> usize;

    /// `TOP n` style row limit placed right after `SELECT`.
    fn top_clause(&self, _limit: u64) -> Option<String> {
        None
    }

    /// `LIMIT n` style row limit appended to the statement.
    fn limit_clause(&self, limit: u64) -> Option<String> {
        Some(format!("LIMIT {limit}"))
    }

    /// Insert clause that leaves rows with an existing key untouched.
    fn skip_duplicates(&self, keys: &[String]) -> Result<OnConflict, UnsupportedCapability>;

    /// Insert clause that overwrites every non-key column of rows with an
    /// existing key. With nothing left to overwrite it degrades to
    /// [`Dialect::skip_duplicates`].
    fn upsert(&self, keys: &[String], columns: &[String])
    -> Result<OnConflict, UnsupportedCapability>;

    /// Renders the value proposed for insertion into `column`, as used on the
    /// right-hand side of an update-on-conflict assignment.
    fn incoming_value(&self, column: &str) -> String;

    /// Statement keyword(s) opening an insert carrying `on_conflict`.
    fn insert_verb(&self, _on_conflict: Option<&OnConflict>) -> &'static str {
        "INSERT INTO"
    }

    /// Trailing conflict clause, empty when the verb already carries it.
    fn conflict_suffix(&self, on_conflict: &OnConflict) -> String;

    /// Fully qualified table name.
    fn qualify(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.name)
            ),
            None => self.quote_identifier(&table.name),
        }
    }

    /// Single-quoted string literal.
    fn quote_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    fn begin_transaction(&self) -> String {
        "BEGIN".to_string()
    }

    fn commit_transaction(&self) -> String {
        "COMMIT".to_string()
    }

    fn rollback_transaction(&self) -> String {
        "ROLLBACK".to_string()
    }

    fn savepoint(&self, name: &str) -> String {
        format!("SAVEPOINT {name}")
    }

    fn rollback_to_savepoint(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {name}")
    }

    /// `None` when the backend releases savepoints implicitly.
    fn release_savepoint(&self, name: &str) -> Option<String> {
        Some(format!("RELEASE SAVEPOINT {name}"))
    }
}

fn require_keys(keys: &[String]) -> Result<(), UnsupportedCapability> {
    if keys.is_empty() {
        Err(UnsupportedCapability::MissingKeySet)
    } else {
        Ok(())
    }
}

fn update_assignments(keys: &[String], columns: &[String]) -> Vec<ConflictAssignment> {
    columns
        .iter()
        .filter(|c| !keys.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .map(|c| ConflictAssignment {
            column: c.clone(),
            value: Expr::Incoming(c.clone()),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }

    fn get_placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn max_bind_params(&self) -> usize {
        u16::MAX as usize
    }

    fn skip_duplicates(&self, keys: &[String]) -> Result<OnConflict, UnsupportedCapability> {
        require_keys(keys)?;
        Ok(OnConflict {
            columns: keys.to_vec(),
            action: ConflictAction::DoNothing,
        })
    }

    fn upsert(
        &self,
        keys: &[String],
        columns: &[String],
    ) -> Result<OnConflict, UnsupportedCapability> {
        require_keys(keys)?;
        let assignments = update_assignments(keys, columns);
        if assignments.is_empty() {
            return self.skip_duplicates(keys);
        }
        Ok(OnConflict {
            columns: keys.to_vec(),
            action: ConflictAction::DoUpdate { assignments },
        })
    }

    fn incoming_value(&self, column: &str) -> String {
        format!("EXCLUDED.{}", self.quote_identifier(column))
    }

    fn conflict_suffix(&self, on_conflict: &OnConflict) -> String {
        let keys: Vec<String> = on_conflict
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let action = match &on_conflict.action {
            ConflictAction::DoUpdate { assignments } if !assignments.is_empty() => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|a| {
                        format!(
                            "{} = {}",
                            self.quote_identifier(&a.column),
                            self.incoming_value(&a.column)
                        )
                    })
                    .collect();
                format!("DO UPDATE SET {}", sets.join(", "))
            }
            _ => "DO NOTHING".to_string(),
        };
        format!(" ON CONFLICT ({}) {action}", keys.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn name(&self) -> String {
        "MySQL".into()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        "?".into()
    }

    fn max_bind_params(&self) -> usize {
        u16::MAX as usize
    }

    fn quote_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn begin_transaction(&self) -> String {
        "START TRANSACTION".to_string()
    }

    fn skip_duplicates(&self, keys: &[String]) -> Result<OnConflict, UnsupportedCapability> {
        require_keys(keys)?;
        Ok(OnConflict {
            columns: keys.to_vec(),
            action: ConflictAction::DoNothing,
        })
    }

    fn upsert(
        &self,
        keys: &[String],
        columns: &[String],
    ) -> Result<OnConflict, UnsupportedCapability> {
        require_keys(keys)?;
        let assignments = update_assignments(keys, columns);
        if assignments.is_empty() {
            return self.skip_duplicates(keys);
        }
        Ok(OnConflict {
            columns: keys.to_vec(),
            action: ConflictAction::DoUpdate { assignments },
        })
    }

    fn incoming_value(&self, column: &str) -> String {
        format!("VALUES({})", self.quote_identifier(column))
    }

    fn insert_verb(&self, on_conflict: Option<&OnConflict>) -> &'static str {
        match on_conflict.map(|c| &c.action) {
            Some(ConflictAction::DoNothing) => "INSERT IGNORE INTO",
            _ => "INSERT INTO",
        }
    }

    fn conflict_suffix(&self, on_conflict: &OnConflict) -> String {
        match &on_conflict.action {
            ConflictAction::DoUpdate { assignments } if !assignments.is_empty() => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|a| {
                        format!(
                            "{} = {}",
                            self.quote_identifier(&a.column),
                            self.incoming_value(&a.column)
                        )
                    })
                    .collect();
                format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MsSql;

impl Dialect for MsSql {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MsSql
    }

    fn name(&self) -> String {
        "SQL Server".into()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn get_placeholder(&self, index: usize) -> String {
        format!("@P{}", index + 1)
    }

    fn max_bind_params(&self) -> usize {
        // The server limit is 2100 including the RPC's own parameters.
        2000
    }

    fn top_clause(&self, limit: u64) -> Option<String> {
        Some(format!("TOP {limit}"))
    }

    fn limit_clause(&self, _limit: u64) -> Option<String> {
        None
    }

    fn quote_literal(&self, text: &str) -> String {
        format!("N'{}'", text.replace('\'', "''"))
    }

    fn skip_duplicates(&self, _keys: &[String]) -> Result<OnConflict, UnsupportedCapability> {
        Err(UnsupportedCapability::SkipDuplicates {
            backend: self.name(),
        })
    }

    fn upsert(
        &self,
        _keys: &[String],
        _columns: &[String],
    ) -> Result<OnConflict, UnsupportedCapability> {
        Err(UnsupportedCapability::Upsert {
            backend: self.name(),
        })
    }

    fn incoming_value(&self, column: &str) -> String {
        self.quote_identifier(column)
    }

    fn conflict_suffix(&self, _on_conflict: &OnConflict) -> String {
        String::new()
    }

    fn begin_transaction(&self) -> String {
        "BEGIN TRANSACTION".to_string()
    }

    fn commit_transaction(&self) -> String {
        "COMMIT TRANSACTION".to_string()
    }

    fn rollback_transaction(&self) -> String {
        "ROLLBACK TRANSACTION".to_string()
    }

    fn savepoint(&self, name: &str) -> String {
        format!("SAVE TRANSACTION {name}")
    }

    fn rollback_to_savepoint(&self, name: &str) -> String {
        format!("ROLLBACK TRANSACTION {name}")
    }

    fn release_savepoint(&self, _name: &str) -> Option<String> {
        None
    }
}
