//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;
use tripwire_core::{CoreError, HarnessConfig};

/// Run a target program against inputs and flag crashes and hangs.
#[derive(Parser, Debug)]
#[command(name = "tripwire", version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Command template, e.g. `./target --input {{.File}}`.
    #[arg(long)]
    pub cmd: Option<String>,

    /// Deliver input through the `{{.File}}` placeholder instead of stdin.
    #[arg(long = "cmd-template")]
    pub cmd_template: bool,

    /// Seed corpus directory, read recursively.
    #[arg(long, value_name = "DIR")]
    pub corpus: Option<PathBuf>,

    /// Directory for per-case input files (required with --cmd-template).
    #[arg(long, value_name = "DIR")]
    pub tmp: Option<PathBuf>,

    /// Extra crash signature appended to the built-in list.
    #[arg(long, value_name = "REGEX")]
    pub signal: Option<String>,

    /// Per-case deadline in seconds.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Keep per-case input files instead of removing them.
    #[arg(long)]
    pub retain_artifacts: bool,

    /// Save failing inputs here as `crash-<sha256>`.
    #[arg(long, value_name = "DIR")]
    pub crash_dir: Option<PathBuf>,

    /// Print one JSON report per case on stdout.
    #[arg(long)]
    pub json: bool,

    /// Input files to run; stdin is read when neither these nor --corpus are given.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,
}

impl Cli {
    /// Merge the config file (if any) with the flags and validate.
    ///
    /// # Errors
    /// Returns the [`CoreError`] from loading or validating the configuration.
    pub fn harness_config(&self) -> Result<HarnessConfig, CoreError> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_json_file(path)?,
            None => HarnessConfig::new(String::new()),
        };

        if let Some(cmd) = &self.cmd {
            config.command.clone_from(cmd);
        }
        if self.cmd_template {
            config.file_placeholder = true;
        }
        if let Some(dir) = &self.corpus {
            config.corpus_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.tmp {
            config.artifact_dir = Some(dir.clone());
        }
        if let Some(signal) = &self.signal {
            config.signal.clone_from(signal);
        }
        if let Some(secs) = self.deadline {
            config.deadline_secs = secs;
        }
        if self.retain_artifacts {
            config.retain_artifacts = true;
        }

        config.validate()?;
        Ok(config)
    }
}
