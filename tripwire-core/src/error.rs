use std::path::PathBuf;

/// Errors produced by the `tripwire-core` crate.
///
/// Template parse, signature compile and configuration errors are fatal and
/// surface before any case runs. Render, tokenize and empty-command errors
/// are scoped to a single case.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The command template is not syntactically valid.
    #[error("invalid command template at byte {offset}: {reason}")]
    TemplateParse { offset: usize, reason: String },

    /// A placeholder value could not be rendered into the template.
    #[error("render command template: {reason}")]
    Render { reason: String },

    /// The rendered command could not be split into words (unbalanced quoting).
    #[error("tokenize command [{rendered}]: unbalanced quoting or dangling escape")]
    Tokenize { rendered: String },

    /// The rendered command contains no words.
    #[error("command rendered to zero arguments")]
    EmptyCommand,

    /// A crash signature pattern failed to compile.
    #[error("invalid crash signature [{pattern}]: {source}")]
    InvalidSignature {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A required configuration option was not supplied.
    #[error("missing required option: {option}")]
    MissingOption { option: &'static str },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The configuration file could not be read or parsed.
    #[error("config file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    /// A corpus entry could not be read.
    #[error("load corpus entry {path}: {source}")]
    Corpus {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
