use crate::error::CliError;
use connectors::sql::base::connection::ConnectionTarget;
use engine_runtime::retry::{RetryPolicy, connect_with_retry};
use planner::query::dialect::DatabaseKind;
use std::time::Instant;
use tracing::{error, info};

/// Connects once and runs `SELECT 1`.
pub async fn test_connection(kind: DatabaseKind, target: &ConnectionTarget) -> Result<(), CliError> {
    let redacted = target.redacted();
    info!(%kind, target = %redacted, "Pinging database");
    let start = Instant::now();

    let adapter = connect_with_retry(&RetryPolicy::none(), kind, target)
        .await
        .map_err(|e| {
            error!(%kind, target = %redacted, error = %e, "Connection failed");
            e
        })?;

    adapter.get_sql().ping().await.map_err(|e| {
        error!(%kind, target = %redacted, error = %e, "Ping query failed");
        e
    })?;

    info!(
        %kind,
        target = %redacted,
        elapsed_ms = start.elapsed().as_millis(),
        "Ping succeeded"
    );
    Ok(())
}
