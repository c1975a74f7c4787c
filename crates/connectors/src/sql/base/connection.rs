use planner::query::dialect::DatabaseKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Discrete connection settings, as an alternative to a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ConnectionParams {
    pub fn port_for(&self, kind: DatabaseKind) -> u16 {
        self.port.unwrap_or_else(|| kind.default_port())
    }
}

/// Where to connect: a backend-native connection string (`postgres://...`,
/// `mysql://...`, or an ADO string for SQL Server) or discrete parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionTarget {
    Url(String),
    Params(ConnectionParams),
}

impl ConnectionTarget {
    /// Printable form with any password masked.
    pub fn redacted(&self) -> String {
        match self {
            ConnectionTarget::Url(url) => redact_url(url),
            ConnectionTarget::Params(p) => format!(
                "{}@{}:{}/{}",
                p.user.as_deref().unwrap_or(""),
                p.host,
                p.port.map(|p| p.to_string()).unwrap_or_default(),
                p.database.as_deref().unwrap_or("")
            ),
        }
    }
}

fn redact_url(url: &str) -> String {
    // ADO style: key=value;password=...;
    if !url.contains("://") {
        return url
            .split(';')
            .map(|part| match part.split_once('=') {
                Some((k, _)) if k.trim().eq_ignore_ascii_case("password") || k.trim().eq_ignore_ascii_case("pwd") => {
                    format!("{k}=***")
                }
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(";");
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((userinfo, host)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_passwords() {
        let url = ConnectionTarget::Url("postgres://app:s3cret@db:5432/crm".into());
        assert_eq!(url.redacted(), "postgres://app:***@db:5432/crm");

        let ado = ConnectionTarget::Url("server=tcp:db,1433;user=sa;Password=x;".into());
        assert_eq!(ado.redacted(), "server=tcp:db,1433;user=sa;Password=***;");
    }

    #[test]
    fn deserializes_either_form() {
        let url: ConnectionTarget = serde_json::from_str(r#""mysql://root@localhost/shop""#).unwrap();
        assert!(matches!(url, ConnectionTarget::Url(_)));

        let params: ConnectionTarget =
            serde_json::from_str(r#"{"host": "db", "user": "sa", "ssl_mode": "require"}"#).unwrap();
        let ConnectionTarget::Params(p) = params else {
            panic!("expected params");
        };
        assert_eq!(p.ssl_mode, SslMode::Require);
        assert_eq!(p.port_for(DatabaseKind::MsSql), 1433);
    }
}
