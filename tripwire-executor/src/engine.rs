//! The seam a fuzzing engine drives.
//!
//! Engines and replay drivers are generic over [`CaseExecutor`], so they
//! can be exercised without spawning real targets.

use async_trait::async_trait;

use crate::{CaseReport, CaseSupervisor, Terminator};

/// Runs one fuzz case per call and reports its verdict.
///
/// # Cancel Safety
/// Dropping the future kills the target (`kill_on_drop`) and removes the
/// case's input artifact, but skips the graceful escalation steps.
#[async_trait]
pub trait CaseExecutor: Send + Sync {
    /// Execute the target against `input`.
    async fn execute(&self, input: &[u8]) -> CaseReport;
}

#[async_trait]
impl<T: Terminator> CaseExecutor for CaseSupervisor<T> {
    async fn execute(&self, input: &[u8]) -> CaseReport {
        self.run_case(input).await
    }
}
