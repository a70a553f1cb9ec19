//! Harness configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signature::DEFAULT_EXTRA_SIGNATURE;
use crate::CoreError;

/// Environment variable holding the command template.
pub const ENV_CMD: &str = "TRIPWIRE_CMD";
/// Environment variable enabling file-placeholder input delivery.
pub const ENV_CMD_TEMPLATE: &str = "TRIPWIRE_CMD_TEMPLATE";
/// Environment variable holding the seed corpus directory.
pub const ENV_CORPUS: &str = "TRIPWIRE_CORPUS";
/// Environment variable holding the artifact directory.
pub const ENV_TMP: &str = "TRIPWIRE_TMP";
/// Environment variable holding the extra crash signature.
pub const ENV_SIGNAL: &str = "TRIPWIRE_SIGNAL";
/// Environment variable holding the per-case deadline in seconds.
pub const ENV_DEADLINE: &str = "TRIPWIRE_DEADLINE";
/// Environment variable keeping input artifacts after each case.
pub const ENV_RETAIN: &str = "TRIPWIRE_RETAIN";

/// Configuration for one harness run.
///
/// Built from a JSON file, the environment, or command-line flags, then
/// checked with [`HarnessConfig::validate`] before any case executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Command template, e.g. `./target --input {{.File}}`.
    #[serde(default)]
    pub command: String,

    /// Deliver input through the `File` placeholder instead of stdin.
    #[serde(default)]
    pub file_placeholder: bool,

    /// Seed corpus directory.
    #[serde(default)]
    pub corpus_dir: Option<PathBuf>,

    /// Directory for per-case input artifacts. Required in file mode.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    /// Extra crash signature appended to the built-in list.
    #[serde(default = "default_signal")]
    pub signal: String,

    /// Per-case deadline in whole seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Keep input artifacts after each case instead of removing them.
    #[serde(default)]
    pub retain_artifacts: bool,
}

fn default_signal() -> String {
    DEFAULT_EXTRA_SIGNATURE.to_owned()
}

fn default_deadline_secs() -> u64 {
    1
}

impl HarnessConfig {
    /// A configuration with defaults for everything but the command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            file_placeholder: false,
            corpus_dir: None,
            artifact_dir: None,
            signal: default_signal(),
            deadline_secs: default_deadline_secs(),
            retain_artifacts: false,
        }
    }

    /// Read configuration from `TRIPWIRE_*` environment variables.
    ///
    /// # Errors
    /// See [`HarnessConfig::from_vars`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup.
    ///
    /// Missing variables take their defaults; the result is validated.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidConfig`] for malformed booleans or
    /// numbers, and any error from [`HarnessConfig::validate`].
    pub fn from_vars<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(lookup(ENV_CMD).unwrap_or_default());
        if let Some(v) = lookup(ENV_CMD_TEMPLATE) {
            config.file_placeholder = parse_bool(ENV_CMD_TEMPLATE, &v)?;
        }
        config.corpus_dir = lookup(ENV_CORPUS).filter(|v| !v.is_empty()).map(PathBuf::from);
        config.artifact_dir = lookup(ENV_TMP).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(v) = lookup(ENV_SIGNAL) {
            config.signal = v;
        }
        if let Some(v) = lookup(ENV_DEADLINE) {
            config.deadline_secs = v.trim().parse().map_err(|e| CoreError::InvalidConfig {
                reason: format!("{ENV_DEADLINE}={v}: {e}"),
            })?;
        }
        if let Some(v) = lookup(ENV_RETAIN) {
            config.retain_artifacts = parse_bool(ENV_RETAIN, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    ///
    /// Missing fields take their defaults. The result is not validated so
    /// that command-line flags can fill in the rest first.
    ///
    /// # Errors
    /// Returns [`CoreError::ConfigFile`] if the file cannot be read or
    /// parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let file_err = |reason: String| CoreError::ConfigFile { path: path.to_owned(), reason };
        let text = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| file_err(e.to_string()))
    }

    /// Check option presence and ranges.
    ///
    /// Template syntax and signature compilation are checked when the
    /// supervisor is built from this configuration.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingOption`] when the command, or the artifact
    /// directory in file mode, is absent; [`CoreError::InvalidConfig`] for a
    /// zero deadline.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.command.trim().is_empty() {
            return Err(CoreError::MissingOption { option: "cmd" });
        }
        if self.file_placeholder && self.artifact_dir.is_none() {
            return Err(CoreError::MissingOption { option: "tmp" });
        }
        if self.deadline_secs == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "deadline must be at least 1 second".to_owned(),
            });
        }
        Ok(())
    }

    /// The per-case deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::InvalidConfig {
            reason: format!("{key}={other} is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> Result<HarnessConfig, CoreError> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        HarnessConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_command_is_set() {
        let config = from_map(&[(ENV_CMD, "./target")]).expect("valid");
        assert_eq!(config, HarnessConfig::new("./target"));
        assert_eq!(config.signal, ".*panic.*");
        assert_eq!(config.deadline(), Duration::from_secs(1));
        assert!(!config.file_placeholder);
    }

    #[test]
    fn missing_command_is_rejected() {
        let err = from_map(&[]).expect_err("must fail");
        assert!(matches!(err, CoreError::MissingOption { option: "cmd" }));
    }

    #[test]
    fn file_mode_requires_artifact_dir() {
        let err = from_map(&[(ENV_CMD, "cat {{.File}}"), (ENV_CMD_TEMPLATE, "true")])
            .expect_err("must fail");
        assert!(matches!(err, CoreError::MissingOption { option: "tmp" }));

        let config = from_map(&[
            (ENV_CMD, "cat {{.File}}"),
            (ENV_CMD_TEMPLATE, "1"),
            (ENV_TMP, "/tmp/tw"),
            (ENV_DEADLINE, "5"),
        ])
        .expect("valid");
        assert!(config.file_placeholder);
        assert_eq!(config.artifact_dir, Some(PathBuf::from("/tmp/tw")));
        assert_eq!(config.deadline_secs, 5);
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let err = from_map(&[(ENV_CMD, "x"), (ENV_DEADLINE, "0")]).expect_err("must fail");
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(from_map(&[(ENV_CMD, "x"), (ENV_DEADLINE, "soon")]).is_err());
        assert!(from_map(&[(ENV_CMD, "x"), (ENV_RETAIN, "maybe")]).is_err());
    }

    #[test]
    fn json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"command": "./target", "deadline_secs": 3}}"#).expect("write");
        let config = HarnessConfig::from_json_file(file.path()).expect("valid");
        assert_eq!(config.command, "./target");
        assert_eq!(config.deadline_secs, 3);
        assert_eq!(config.signal, DEFAULT_EXTRA_SIGNATURE);
    }

    #[test]
    fn json_file_with_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"command": "./target", "timeout": 3}}"#).expect("write");
        let err = HarnessConfig::from_json_file(file.path()).expect_err("must fail");
        assert!(matches!(err, CoreError::ConfigFile { .. }));
    }
}
