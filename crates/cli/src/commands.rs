use crate::{
    conn::test_connection,
    error::CliError,
    output,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Subcommand;
use connectors::{file::csv::source::CsvSource, sql::base::connection::ConnectionTarget};
use engine_config::{
    env::EnvManager,
    migration::{
        MigrationConfig,
        endpoint::{SourceSpec, TableEndpoint},
    },
    settings::RunSettings,
};
use engine_runtime::{
    error::RuntimeError,
    execution::{
        controller::RunStatus,
        executor::{MigrationExecutor, connect, table_metadata},
    },
    retry::RetryPolicy,
};
use model::execution::conflict::ConflictPolicy;
use planner::query::dialect::DatabaseKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the transfer described by a config file
    Migrate {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Rows per batch and per destination transaction")]
        chunk_size: Option<usize>,

        #[arg(long, help = "strict, skip_duplicates or upsert")]
        policy: Option<ConflictPolicy>,

        #[arg(long, help = "Abort on the first failing row instead of rejecting it")]
        no_continue: bool,

        #[arg(
            long,
            help = "Pass values that do not fit their column through instead of nulling them"
        )]
        strict_values: bool,

        #[arg(long, help = "Where to write rejected rows")]
        rejects: Option<PathBuf>,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<PathBuf>,
    },
    /// Show the first rows of the configured source
    Preview {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Test a connection string against a given backend
    TestConn {
        /// Backend: "postgres", "mysql" or "mssql"
        #[arg(long)]
        kind: DatabaseKind,

        /// Connection URL, or an ADO string for SQL Server
        #[arg(long)]
        conn_str: String,
    },
    /// List a table's columns with their type class and key flag
    Columns {
        #[arg(long)]
        kind: DatabaseKind,

        #[arg(long)]
        conn_str: String,

        #[arg(long)]
        schema: Option<String>,

        #[arg(long)]
        table: String,

        #[arg(long, help = "Print the metadata as JSON instead of a table")]
        json: bool,
    },
    /// Print a mapping that pairs same-named columns
    AutoMap {
        #[arg(long, help = "Config file path")]
        config: PathBuf,
    },
}

/// Settings given on the command line, applied over the config file.
struct Overrides {
    chunk_size: Option<usize>,
    policy: Option<ConflictPolicy>,
    no_continue: bool,
    strict_values: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut RunSettings) {
        if let Some(chunk_size) = self.chunk_size {
            settings.chunk_size = chunk_size;
        }
        if let Some(policy) = self.policy {
            settings.conflict_policy = policy;
        }
        if self.no_continue {
            settings.continue_on_error = false;
        }
        if self.strict_values {
            settings.coerce_invalid_to_null = false;
        }
    }
}

pub async fn dispatch(
    command: Commands,
    env: &EnvManager,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    match command {
        Commands::Migrate {
            config,
            chunk_size,
            policy,
            no_continue,
            strict_values,
            rejects,
            output,
        } => {
            let overrides = Overrides {
                chunk_size,
                policy,
                no_continue,
                strict_values,
            };
            migrate(&config, overrides, rejects, output.as_deref(), env, shutdown).await
        }
        Commands::Preview { config, limit } => {
            let config = MigrationConfig::load(&config, env)?;
            let rows = match &config.source {
                SourceSpec::Database(endpoint) => {
                    let adapter = connect(&RetryPolicy::default(), endpoint).await?;
                    adapter.get_sql().preview(&endpoint.table_ref(), limit).await?
                }
                SourceSpec::File(file) => {
                    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                    CsvSource::open(&file.path, file.csv.clone())?.preview(limit)?
                }
            };
            output::print_rows(&rows)?;
            Ok(ExitCode::Success)
        }
        Commands::TestConn { kind, conn_str } => {
            let target = ConnectionTarget::Url(env.interpolate(&conn_str)?);
            test_connection(kind, &target).await?;
            Ok(ExitCode::Success)
        }
        Commands::Columns {
            kind,
            conn_str,
            schema,
            table,
            json,
        } => {
            let endpoint = TableEndpoint {
                kind,
                connection: ConnectionTarget::Url(env.interpolate(&conn_str)?),
                schema,
                table,
            };
            let adapter = connect(&RetryPolicy::default(), &endpoint).await?;
            let metadata = table_metadata(&adapter, &endpoint).await?;
            if json {
                output::print_json(&metadata)?;
            } else {
                output::print_columns(&metadata);
            }
            Ok(ExitCode::Success)
        }
        Commands::AutoMap { config } => {
            let config = MigrationConfig::load(&config, env)?;
            let executor = MigrationExecutor::new(config, shutdown.cancel_token());
            let mapping = executor.propose_mapping().await?;
            output::print_json(&mapping)?;
            Ok(ExitCode::Success)
        }
    }
}

async fn migrate(
    path: &Path,
    overrides: Overrides,
    rejects: Option<PathBuf>,
    output: Option<&Path>,
    env: &EnvManager,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    let mut config = MigrationConfig::load(path, env)?;
    overrides.apply(&mut config.settings);
    config.settings.validate()?;
    if rejects.is_some() {
        config.rejects_path = rejects;
    }

    info!(config = %path.display(), "Loaded migration config");
    let executor = MigrationExecutor::new(config, shutdown.cancel_token());

    match executor.execute().await {
        Ok(report) => {
            output::emit_report(&report, output).await?;
            match report.status {
                RunStatus::Completed => Ok(ExitCode::Success),
                RunStatus::Cancelled => {
                    warn!(
                        signal = shutdown.is_shutdown_requested(),
                        batches = report.batches,
                        "Migration cancelled"
                    );
                    Ok(ExitCode::ShutdownRequested)
                }
            }
        }
        Err(RuntimeError::Run(failure)) => {
            error!(error = %failure, "Migration aborted");
            output::emit_failure(&failure, output).await?;
            Ok(ExitCode::RunAborted)
        }
        Err(err) => Err(err.into()),
    }
}
