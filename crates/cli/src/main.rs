use crate::{
    commands::Commands,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use engine_config::env::EnvManager;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "stratum-transfer",
    version,
    about = "Copies rows from one database table into another"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Extra KEY=VALUE file consulted for ${VAR} references
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    commands::dispatch(cli.command, &env, &shutdown).await
}

/// Logs go to stderr so reports on stdout stay machine readable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
