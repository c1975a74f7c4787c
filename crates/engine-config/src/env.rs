use crate::error::ConfigError;
use std::{collections::HashMap, fs, path::Path};

/// Variables available to `${VAR}` references: the process environment,
/// overlaid by any `.env` files loaded afterwards.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// Load variables from a .env file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.parse_env_content(&content)
            .map_err(|detail| ConfigError::EnvFile {
                path: path.to_path_buf(),
                detail,
            })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Replaces every `${NAME}` in `input`. `$$` is a literal dollar sign; a
    /// `$` not followed by `{` is kept as is.
    pub fn interpolate(&self, input: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos + 1..];

            if let Some(after) = tail.strip_prefix('$') {
                out.push('$');
                rest = after;
            } else if let Some(body) = tail.strip_prefix('{') {
                let Some(end) = body.find('}') else {
                    // Unterminated reference: keep the text verbatim.
                    out.push_str(&rest[pos..]);
                    return Ok(out);
                };
                let name = body[..end].trim();
                let value = self
                    .get(name)
                    .ok_or_else(|| ConfigError::UnresolvedVariable(name.to_string()))?;
                out.push_str(value);
                rest = &body[end + 1..];
            } else {
                out.push('$');
                rest = tail;
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), String> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("empty key at line {}", line_num + 1));
            }

            self.vars
                .insert(key.to_string(), Self::unquote_value(value.trim()));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_quoted_values() {
        let mut env = EnvManager::empty();
        let content = r#"
# Comment
QUOTED="value with spaces"
SINGLE='single quoted'
export UNQUOTED=no_spaces
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("QUOTED"), Some("value with spaces"));
        assert_eq!(env.get("SINGLE"), Some("single quoted"));
        assert_eq!(env.get("UNQUOTED"), Some("no_spaces"));
    }

    #[test]
    fn test_invalid_env_format() {
        let mut env = EnvManager::empty();
        assert!(env.parse_env_content("INVALID LINE WITHOUT EQUALS").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn interpolates_references() {
        let mut env = EnvManager::empty();
        env.set("PGUSER", "etl");
        env.set("PGPASS", "p@ss");

        let url = env
            .interpolate("postgres://${PGUSER}:${ PGPASS }@db/crm?cost=$$5&x=$y")
            .unwrap();
        assert_eq!(url, "postgres://etl:p@ss@db/crm?cost=$5&x=$y");
        assert_eq!(env.interpolate("tail ${open").unwrap(), "tail ${open");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let env = EnvManager::empty();
        assert!(matches!(
            env.interpolate("mysql://${DB_USER}@localhost"),
            Err(ConfigError::UnresolvedVariable(name)) if name == "DB_USER"
        ));
    }

    #[test]
    fn env_file_overrides_process_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DB_HOST=from-file").unwrap();

        let mut env = EnvManager::empty();
        env.set("DB_HOST", "from-process");
        env.load_from_file(file.path()).unwrap();
        assert_eq!(env.get("DB_HOST"), Some("from-file"));

        let missing = env.load_from_file("/nonexistent/.env");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
