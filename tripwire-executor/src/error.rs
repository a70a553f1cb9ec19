//! Error types for the executor crate.

use tripwire_core::{CoreError, Stream};

/// Errors that end a single case without a crash or timeout verdict.
///
/// None of these abort the run; the supervisor turns them into
/// [`tripwire_core::CaseOutcome::InternalError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CaseError {
    /// The command could not be rendered or tokenized for this case.
    #[error(transparent)]
    Resolve(#[from] CoreError),

    /// The target process could not be started.
    #[error("start [{program}]: {source}")]
    Start {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A standard stream of the target could not be attached.
    #[error("attach {stream} pipe of target")]
    Pipe { stream: &'static str },

    /// The case input could not be delivered.
    #[error("write case input to {destination}: {source}")]
    InputWrite {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    /// An output stream failed while it was being scanned.
    #[error("read {stream} of target: {source}")]
    StreamRead {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },
}
