use crate::sql::base::{
    connection::{ConnectionParams, ConnectionTarget, SslMode},
    error::ConnectorError,
};
use planner::query::dialect::DatabaseKind;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

pub type MsSqlClient = Client<Compat<TcpStream>>;

pub(crate) async fn connect_client(target: &ConnectionTarget) -> Result<MsSqlClient, ConnectorError> {
    let config = match target {
        ConnectionTarget::Url(url) if url.starts_with("jdbc:") => Config::from_jdbc_string(url)?,
        ConnectionTarget::Url(url) => Config::from_ado_string(url)?,
        ConnectionTarget::Params(params) => config_from_params(params),
    };

    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    let client = Client::connect(config, tcp.compat_write()).await?;
    Ok(client)
}

fn config_from_params(params: &ConnectionParams) -> Config {
    let mut config = Config::new();
    config.host(&params.host);
    config.port(params.port_for(DatabaseKind::MsSql));
    if let Some(database) = &params.database {
        config.database(database);
    }
    config.authentication(AuthMethod::sql_server(
        params.user.as_deref().unwrap_or_default(),
        params.password.as_deref().unwrap_or_default(),
    ));
    match params.ssl_mode {
        SslMode::Disable => config.encryption(EncryptionLevel::NotSupported),
        SslMode::Prefer => {
            config.encryption(EncryptionLevel::Off);
            config.trust_cert();
        }
        SslMode::Require => config.encryption(EncryptionLevel::Required),
    }
    config.application_name("stratum-transfer");
    config
}
