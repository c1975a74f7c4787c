use crate::sql::base::{
    connection::{ConnectionParams, ConnectionTarget, SslMode},
    error::ConnectorError,
};
use native_tls::TlsConnector;
use planner::query::dialect::DatabaseKind;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Config, NoTls, config::SslMode as PgSslMode};
use tracing::{error, warn};

pub(crate) async fn connect_client(target: &ConnectionTarget) -> Result<Client, ConnectorError> {
    let config = match target {
        ConnectionTarget::Url(url) => url
            .parse::<Config>()
            .map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?,
        ConnectionTarget::Params(params) => config_from_params(params),
    };

    match config.get_ssl_mode() {
        PgSslMode::Disable => connect_without_tls(config).await,
        PgSslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

fn config_from_params(params: &ConnectionParams) -> Config {
    let mut config = Config::new();
    config
        .host(&params.host)
        .port(params.port_for(DatabaseKind::Postgres))
        .application_name("stratum-transfer");
    if let Some(database) = &params.database {
        config.dbname(database);
    }
    if let Some(user) = &params.user {
        config.user(user);
    }
    if let Some(password) = &params.password {
        config.password(password);
    }
    config.ssl_mode(match params.ssl_mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
    });
    config
}

async fn connect_with_tls(config: Config) -> Result<Client, ConnectorError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_map_onto_driver_config() {
        let config = config_from_params(&ConnectionParams {
            host: "db.internal".into(),
            port: None,
            database: Some("crm".into()),
            user: Some("etl".into()),
            password: Some("pw".into()),
            ssl_mode: SslMode::Require,
        });
        assert_eq!(config.get_ports(), &[5432]);
        assert_eq!(config.get_dbname(), Some("crm"));
        assert_eq!(config.get_user(), Some("etl"));
        assert_eq!(config.get_ssl_mode(), PgSslMode::Require);
    }
}
