//! Entry point for the `tripwire` binary.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tripwire_cli::{run, Cli, CliError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::warn!(failed = summary.failed, total = summary.total, "failing cases found");
            ExitCode::from(1)
        }
        Err(e @ CliError::Core(_)) => {
            tracing::error!(error = %e, "invalid configuration");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "run aborted");
            ExitCode::from(2)
        }
    }
}
