use crate::{env::EnvManager, error::ConfigError};
use connectors::{
    file::csv::settings::CsvSettings,
    sql::base::connection::{ConnectionParams, ConnectionTarget},
};
use planner::query::{ast::common::TableRef, dialect::DatabaseKind};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// A table on a database server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEndpoint {
    pub kind: DatabaseKind,
    pub connection: ConnectionTarget,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

impl TableEndpoint {
    /// Table reference with the backend's default schema filled in.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema.as_deref(), &self.table).or_schema(self.kind.default_schema())
    }

    pub fn resolve_env(&mut self, env: &EnvManager) -> Result<(), ConfigError> {
        self.connection = match &self.connection {
            ConnectionTarget::Url(url) => ConnectionTarget::Url(env.interpolate(url)?),
            ConnectionTarget::Params(params) => ConnectionTarget::Params(ConnectionParams {
                host: env.interpolate(&params.host)?,
                port: params.port,
                database: interpolate_opt(env, &params.database)?,
                user: interpolate_opt(env, &params.user)?,
                password: interpolate_opt(env, &params.password)?,
                ssl_mode: params.ssl_mode,
            }),
        };
        Ok(())
    }
}

impl fmt::Display for TableEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.table_ref())
    }
}

fn interpolate_opt(env: &EnvManager, value: &Option<String>) -> Result<Option<String>, ConfigError> {
    value.as_deref().map(|v| env.interpolate(v)).transpose()
}

/// A delimited file with a header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEndpoint {
    pub path: PathBuf,
    #[serde(flatten)]
    pub csv: CsvSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Database(TableEndpoint),
    File(FileEndpoint),
}

impl SourceSpec {
    pub fn resolve_env(&mut self, env: &EnvManager) -> Result<(), ConfigError> {
        match self {
            SourceSpec::Database(endpoint) => endpoint.resolve_env(env),
            SourceSpec::File(_) => Ok(()),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Database(endpoint) => endpoint.fmt(f),
            SourceSpec::File(file) => write!(f, "file {}", file.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_follows_backend() {
        let endpoint: TableEndpoint = serde_json::from_str(
            r#"{"kind": "mssql", "connection": "server=tcp:db,1433", "table": "Orders"}"#,
        )
        .unwrap();
        assert_eq!(endpoint.table_ref(), TableRef::new(Some("dbo"), "Orders"));
        assert_eq!(endpoint.to_string(), "mssql dbo.Orders");
    }

    #[test]
    fn env_references_resolve_in_params() {
        let mut endpoint: TableEndpoint = serde_json::from_str(
            r#"{
                "kind": "postgres",
                "connection": {"host": "${DB_HOST}", "user": "etl", "password": "${DB_PASS}"},
                "table": "users"
            }"#,
        )
        .unwrap();
        let mut env = EnvManager::empty();
        env.set("DB_HOST", "10.0.0.5");
        env.set("DB_PASS", "hunter2");
        endpoint.resolve_env(&env).unwrap();

        let ConnectionTarget::Params(params) = &endpoint.connection else {
            panic!("expected params");
        };
        assert_eq!(params.host, "10.0.0.5");
        assert_eq!(params.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn file_source_takes_csv_settings() {
        let source: SourceSpec =
            serde_json::from_str(r#"{"type": "file", "path": "in.csv", "delimiter": "|"}"#)
                .unwrap();
        let SourceSpec::File(file) = source else {
            panic!("expected file source");
        };
        assert_eq!(file.csv.delimiter, '|');
        assert!(file.csv.trim);
    }
}
