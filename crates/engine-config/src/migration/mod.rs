use crate::{
    env::EnvManager,
    error::ConfigError,
    migration::{
        endpoint::{SourceSpec, TableEndpoint},
        mapping::MappingSpec,
    },
    settings::RunSettings,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod endpoint;
pub mod mapping;

/// One source → destination transfer, as read from a JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source: SourceSpec,
    pub destination: TableEndpoint,
    /// Absent means: map destination columns to same-named source columns.
    #[serde(default)]
    pub mapping: Option<MappingSpec>,
    #[serde(default)]
    pub settings: RunSettings,
    /// Where rejected rows are written. Defaults to
    /// `rejected_rows_<schema>_<table>.csv` in the working directory.
    #[serde(default)]
    pub rejects_path: Option<PathBuf>,
}

impl MigrationConfig {
    /// Reads, interpolates and validates a config file.
    pub fn load(path: &Path, env: &EnvManager) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded migration config");
        Self::parse(&content, env)
    }

    pub fn parse(content: &str, env: &EnvManager) -> Result<Self, ConfigError> {
        let mut config: MigrationConfig = serde_json::from_str(content)?;
        config.source.resolve_env(env)?;
        config.destination.resolve_env(env)?;
        config.settings.validate()?;
        Ok(config)
    }

    pub fn rejects_path(&self) -> PathBuf {
        self.rejects_path.clone().unwrap_or_else(|| {
            let table = self.destination.table_ref();
            let name = match &table.schema {
                Some(schema) => format!("rejected_rows_{schema}_{}.csv", table.name),
                None => format!("rejected_rows_{}.csv", table.name),
            };
            PathBuf::from(name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::conflict::ConflictPolicy;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "source": {
            "type": "database",
            "kind": "mysql",
            "connection": "mysql://${SRC_USER}:pw@legacy/shop",
            "table": "customers"
        },
        "destination": {
            "kind": "postgres",
            "connection": "postgres://etl@warehouse/crm",
            "schema": "sales",
            "table": "customers"
        },
        "mapping": [
            {"destination": "id", "expression": "customer_id"},
            {"destination": "origin", "expression": "'legacy'"}
        ],
        "settings": {"chunk_size": 1000, "conflict_policy": "strict"}
    }"#;

    #[test]
    fn loads_file_and_resolves_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let mut env = EnvManager::empty();
        env.set("SRC_USER", "reader");

        let config = MigrationConfig::load(file.path(), &env).unwrap();
        let SourceSpec::Database(source) = &config.source else {
            panic!("expected database source");
        };
        assert_eq!(
            source.connection,
            connectors::sql::base::connection::ConnectionTarget::Url(
                "mysql://reader:pw@legacy/shop".into()
            )
        );
        assert_eq!(config.settings.chunk_size, 1000);
        assert_eq!(config.settings.conflict_policy, ConflictPolicy::Strict);
        assert_eq!(config.mapping.map(|m| m.to_raw().len()), Some(2));
        assert_eq!(
            config.rejects_path,
            None,
        );
    }

    #[test]
    fn default_rejects_path_names_the_table() {
        let mut env = EnvManager::empty();
        env.set("SRC_USER", "reader");
        let config = MigrationConfig::parse(CONFIG, &env).unwrap();
        assert_eq!(
            config.rejects_path(),
            PathBuf::from("rejected_rows_sales_customers.csv")
        );
    }

    #[test]
    fn invalid_settings_fail_the_load() {
        let env = EnvManager::empty();
        let content = CONFIG
            .replace("${SRC_USER}", "reader")
            .replace("\"chunk_size\": 1000", "\"chunk_size\": 0");
        assert!(matches!(
            MigrationConfig::parse(&content, &env),
            Err(ConfigError::InvalidSetting { name: "chunk_size", .. })
        ));
    }
}
