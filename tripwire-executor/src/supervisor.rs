//! Per-case supervision: launch, race, escalate, report.
//!
//! The supervisor waits, without polling, on the first decisive event of a
//! case: the deadline, a crash signature on stdout or stderr, or the target
//! exiting with both streams drained. A crash or timeout on a live target
//! hands it to the [`Escalator`]; a clean exit sends no signals at all.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::oneshot;
use tripwire_core::{
    CaseId, CaseOutcome, CommandTemplate, CoreError, CrashSignatureSet, HarnessConfig,
    InputDigest, PlaceholderValues, Stream,
};

use crate::launcher::{launch, log_exit, InputDelivery, TargetProcess};
use crate::monitor::ScanVerdict;
use crate::{CaseError, CaseReport, EscalationResult, Escalator, PlatformTerminator, Terminator};

/// Supervises one case at a time against a fixed command template.
///
/// Holds only read-only state, so a single supervisor serves every case of
/// a run; cases are expected to run one after another.
#[derive(Debug)]
pub struct CaseSupervisor<T: Terminator = PlatformTerminator> {
    template: CommandTemplate,
    signatures: Arc<CrashSignatureSet>,
    delivery: InputDelivery,
    deadline: Duration,
    escalator: Escalator<T>,
}

impl CaseSupervisor<PlatformTerminator> {
    /// Build a supervisor from a validated configuration.
    ///
    /// Parses the template, compiles the crash signatures and, in file mode,
    /// creates the artifact directory.
    ///
    /// # Errors
    /// Returns the first fatal startup error: invalid options, template parse
    /// failure, signature compile failure, or an artifact directory that
    /// cannot be created.
    pub fn from_config(config: &HarnessConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let template = CommandTemplate::parse(&config.command)?;
        let signatures = CrashSignatureSet::with_extra(&config.signal)?;

        let delivery = match (&config.artifact_dir, config.file_placeholder) {
            (Some(dir), true) => {
                std::fs::create_dir_all(dir).map_err(|e| CoreError::InvalidConfig {
                    reason: format!("create artifact dir {}: {e}", dir.display()),
                })?;
                InputDelivery::File { dir: dir.clone(), retain: config.retain_artifacts }
            }
            _ => InputDelivery::Stdin,
        };

        Self::new(
            template,
            signatures,
            delivery,
            config.deadline(),
            Escalator::new(PlatformTerminator),
        )
    }
}

impl<T: Terminator> CaseSupervisor<T> {
    /// Assemble a supervisor from its parts.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidConfig`] when the signature set is empty,
    /// or when the delivery mode and the template disagree: file delivery needs a `{{.File}}` placeholder to
    /// pass the path on, and stdin delivery has no file to substitute.
    pub fn new(
        template: CommandTemplate,
        signatures: CrashSignatureSet,
        delivery: InputDelivery,
        deadline: Duration,
        escalator: Escalator<T>,
    ) -> Result<Self, CoreError> {
        if signatures.is_empty() {
            return Err(CoreError::InvalidConfig {
                reason: "no crash signatures to match output against".to_owned(),
            });
        }
        match (&delivery, template.uses_file()) {
            (InputDelivery::File { .. }, false) => {
                return Err(CoreError::InvalidConfig {
                    reason: format!(
                        "file placeholder enabled but [{}] never references {{{{.File}}}}",
                        template.source()
                    ),
                });
            }
            (InputDelivery::Stdin, true) => {
                return Err(CoreError::InvalidConfig {
                    reason: format!(
                        "[{}] references {{{{.File}}}} but the file placeholder is disabled",
                        template.source()
                    ),
                });
            }
            _ => {}
        }

        Ok(Self {
            template,
            signatures: Arc::new(signatures),
            delivery,
            deadline,
            escalator,
        })
    }

    /// Per-case deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run the target once against `input` and report the verdict.
    ///
    /// Never fails: harness errors become [`CaseOutcome::InternalError`].
    /// Every task, pipe and unretained artifact of the case is released
    /// before this returns.
    pub async fn run_case(&self, input: &[u8]) -> CaseReport {
        let id = CaseId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        let (outcome, escalation) = match self.drive(id, input).await {
            Ok(decided) => decided,
            Err(e) => {
                tracing::warn!(case_id = %id, error = %e, "case could not run");
                (CaseOutcome::InternalError { cause: e.to_string() }, None)
            }
        };

        let mut report =
            CaseReport::new(id, InputDigest::of(input), started_at, clock.elapsed(), outcome);
        report.escalation = escalation;
        if let InputDelivery::File { dir, retain: true } = &self.delivery {
            report.artifact = Some(dir.join(id.to_string())).filter(|p| p.exists());
        }

        match report.outcome.reason() {
            Some(reason) => tracing::info!(case_id = %id, %reason, "case failed"),
            None => tracing::debug!(case_id = %id, elapsed_ms = report.elapsed.as_millis(), "case passed"),
        }
        report
    }

    async fn drive(
        &self,
        id: CaseId,
        input: &[u8],
    ) -> Result<(CaseOutcome, Option<EscalationResult>), CaseError> {
        let name = id.to_string();
        let values = match &self.delivery {
            InputDelivery::File { dir, .. } => PlaceholderValues::new(dir, &name),
            InputDelivery::Stdin => PlaceholderValues::new(Path::new(""), &name),
        };
        let command = self.template.resolve(&values)?;

        let mut target = launch(id, &command, input, &self.delivery, &self.signatures).await?;
        Ok(self.settle(&mut target).await)
    }

    /// Decide a launched case and make sure nothing of it outlives the case.
    ///
    /// A live target is escalated. A target that exited while processes it
    /// started still held its output open has those processes swept.
    async fn settle(&self, target: &mut TargetProcess) -> (CaseOutcome, Option<EscalationResult>) {
        let (outcome, output_open) = race(target, self.deadline).await;

        if !target.exited {
            return (outcome, Some(self.escalator.stop(target).await));
        }
        if output_open {
            self.escalator.sweep(target);
        }
        (outcome, None)
    }
}

/// Wait for the first decisive event of the case.
///
/// An exit only decides the case once both monitors have reported, so a
/// signature printed just before exiting is not missed. If the deadline
/// passes after the exit while a stream is still held open (typically by
/// a leftover child), the case passes.
///
/// Also returns whether output may still be held open by something the
/// target started. A matched stream counts as open, since it is drained
/// in the background.
async fn race(target: &mut TargetProcess, deadline: Duration) -> (CaseOutcome, bool) {
    let pid = target.pid;
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut input_pending = true;

    loop {
        if target.exited && !stdout_open && !stderr_open {
            return (CaseOutcome::Pass, false);
        }
        let output_open = stdout_open || stderr_open;

        tokio::select! {
            () = &mut sleep => {
                if target.exited {
                    tracing::debug!(pid, "target exited, output still open at deadline");
                    return (CaseOutcome::Pass, output_open);
                }
                tracing::info!(pid, deadline_ms = deadline.as_millis(), "deadline elapsed");
                return (CaseOutcome::Timeout { deadline }, output_open);
            }
            verdict = &mut target.stdout, if stdout_open => {
                stdout_open = false;
                if let Some(outcome) = judge(pid, Stream::Stdout, verdict) {
                    return (outcome, true);
                }
            }
            verdict = &mut target.stderr, if stderr_open => {
                stderr_open = false;
                if let Some(outcome) = judge(pid, Stream::Stderr, verdict) {
                    return (outcome, true);
                }
            }
            written = &mut target.input, if input_pending => {
                input_pending = false;
                match written {
                    Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                        let err = CaseError::InputWrite { destination: "stdin".to_owned(), source: e };
                        return (CaseOutcome::InternalError { cause: err.to_string() }, output_open);
                    }
                    Ok(Err(_)) => tracing::debug!(pid, "target closed stdin before reading all input"),
                    Ok(Ok(())) | Err(_) => {}
                }
            }
            report = &mut target.exit, if !target.exited => {
                target.exited = true;
                log_exit(pid, report);
            }
        }
    }
}

/// Turn a monitor report into an outcome, or `None` if the case goes on.
fn judge(
    pid: u32,
    stream: Stream,
    verdict: Result<ScanVerdict, oneshot::error::RecvError>,
) -> Option<CaseOutcome> {
    match verdict {
        Ok(ScanVerdict::Matched(found)) => {
            tracing::info!(pid, %stream, line = %found.line, pattern = %found.pattern, "crash signature matched");
            Some(CaseOutcome::crash(stream, found))
        }
        Ok(ScanVerdict::Failed(source)) => {
            let err = CaseError::StreamRead { stream, source };
            Some(CaseOutcome::InternalError { cause: err.to_string() })
        }
        Ok(ScanVerdict::Clean) => {
            tracing::debug!(pid, %stream, "stream closed clean");
            None
        }
        Err(_) => {
            tracing::debug!(pid, %stream, "monitor ended without a verdict");
            None
        }
    }
}
