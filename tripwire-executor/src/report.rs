//! Per-case execution report.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripwire_core::{CaseId, CaseOutcome, InputDigest};

use crate::EscalationResult;

/// A complete record of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CaseReport {
    /// Unique identifier for this case.
    pub id: CaseId,
    /// SHA-256 of the case input.
    pub input_digest: InputDigest,
    /// When the case began.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration, including any escalation.
    pub elapsed: Duration,
    /// The verdict.
    pub outcome: CaseOutcome,
    /// How the target was stopped, if it had to be.
    pub escalation: Option<EscalationResult>,
    /// Input artifact left on disk, if artifacts are retained.
    pub artifact: Option<PathBuf>,
}

impl CaseReport {
    /// Create a report with no escalation and no retained artifact.
    #[must_use]
    pub fn new(
        id: CaseId,
        input_digest: InputDigest,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: CaseOutcome,
    ) -> Self {
        Self {
            id,
            input_digest,
            started_at,
            elapsed,
            outcome,
            escalation: None,
            artifact: None,
        }
    }

    /// Whether the fuzzing engine should record this case as a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}
