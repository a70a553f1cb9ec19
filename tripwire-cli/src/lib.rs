//! Command-line front end for the tripwire harness.
//!
//! Replays a seed corpus and individual input files through the case
//! supervisor, one case at a time, and reports crashes, hangs and harness
//! errors.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use tripwire_core::CoreError;
use tripwire_executor::CaseSupervisor;

pub mod args;
pub mod replay;

pub use args::Cli;
pub use replay::{collect_cases, replay, Case, Summary};

/// Errors that stop a CLI run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CliError {
    /// Configuration, template, signature or corpus error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An input file or stdin could not be read.
    #[error("read input {source_name}: {source}")]
    ReadInput {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// A failing input could not be saved.
    #[error("save failing input to {path}: {source}")]
    SaveCrash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing results failed.
    #[error("write results: {0}")]
    Output(#[from] std::io::Error),
}

/// Build the supervisor from `cli` and replay every case.
///
/// # Errors
/// Returns [`CliError`] for fatal startup errors and I/O failures; case
/// failures are counted in the [`Summary`], not returned as errors.
pub async fn run(cli: &Cli) -> Result<Summary, CliError> {
    let config = cli.harness_config()?;
    let supervisor = CaseSupervisor::from_config(&config)?;
    let cases = collect_cases(&config, &cli.inputs, std::io::stdin().lock())?;

    tracing::info!(
        cmd = %config.command,
        cases = cases.len(),
        deadline_secs = config.deadline_secs,
        "starting replay"
    );

    let mut out = std::io::stdout().lock();
    replay(&supervisor, &cases, cli.crash_dir.as_deref(), cli.json, &mut out).await
}
