use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signature::SignatureMatch;

/// One of the two captured output streams of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// The verdict for one fuzz case. Produced exactly once per case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CaseOutcome {
    /// The target exited within the deadline without a crash signature.
    Pass,
    /// A crash signature matched a line on one of the output streams.
    Crash {
        /// Stream the line appeared on.
        stream: Stream,
        /// Pattern that matched.
        pattern: String,
        /// The offending line.
        line: String,
    },
    /// The deadline elapsed before the target exited.
    Timeout {
        /// The configured deadline.
        deadline: Duration,
    },
    /// The harness could not run the case.
    InternalError {
        /// Human-readable cause.
        cause: String,
    },
}

impl CaseOutcome {
    /// A crash outcome from a signature match on `stream`.
    #[must_use]
    pub fn crash(stream: Stream, found: SignatureMatch) -> Self {
        Self::Crash {
            stream,
            pattern: found.pattern,
            line: found.line,
        }
    }

    /// Whether the fuzzing engine should treat this case as a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Pass)
    }

    /// Failure reason for the fuzzing engine, `None` on pass.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Pass => None,
            Self::Crash { stream, pattern, line } => {
                Some(format!("{stream}: [{line}] matched [{pattern}]"))
            }
            Self::Timeout { deadline } => {
                Some(format!("deadline of {}s elapsed", deadline.as_secs_f64()))
            }
            Self::InternalError { cause } => Some(format!("harness error: {cause}")),
        }
    }
}
