//! Termination escalation.
//!
//! A target that must be stopped gets three increasingly forceful signals,
//! each followed by a bounded wait for its exit report. Signal delivery is
//! abstracted behind [`Terminator`] so each platform maps the three steps
//! onto what it supports.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TargetProcess;

/// Wait after each escalation step before trying the next one.
pub const ESCALATION_WINDOW: Duration = Duration::from_secs(1);

/// One step of the escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStep {
    /// Polite stop (SIGINT on Unix).
    Interrupt,
    /// Termination request (SIGTERM on Unix).
    Terminate,
    /// Forceful kill (SIGKILL on Unix).
    Kill,
}

impl EscalationStep {
    /// The steps in the order they are tried.
    pub const SEQUENCE: [Self; 3] = [Self::Interrupt, Self::Terminate, Self::Kill];
}

impl fmt::Display for EscalationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Kill => "kill",
        })
    }
}

/// How an escalation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EscalationResult {
    /// The target exited within the window following `after`.
    Exited { after: EscalationStep },
    /// The target outlived the forceful kill and was left for external cleanup.
    Unresponsive,
}

/// Platform capability for stopping a target.
///
/// Implementations must be `Send + Sync` so one instance can serve every case.
pub trait Terminator: Send + Sync {
    /// Ask the target to stop.
    ///
    /// # Errors
    /// Returns the OS error if the signal could not be delivered.
    fn interrupt(&self, target: &TargetProcess) -> io::Result<()>;

    /// Tell the target to terminate.
    ///
    /// # Errors
    /// Returns the OS error if the signal could not be delivered.
    fn terminate(&self, target: &TargetProcess) -> io::Result<()>;

    /// Kill the target outright.
    ///
    /// # Errors
    /// Returns the OS error if the signal could not be delivered.
    fn kill(&self, target: &TargetProcess) -> io::Result<()>;

    /// Kill whatever the target left behind after it exited itself.
    ///
    /// Called only once the target's own exit has been observed, for
    /// processes it started that still hold its output open.
    ///
    /// # Errors
    /// Returns the OS error if the signal could not be delivered.
    fn sweep(&self, target: &TargetProcess) -> io::Result<()>;
}

/// The host platform's [`Terminator`].
///
/// On Unix the target leads its own process group and every step signals
/// the whole group, so helpers it spawned are stopped with it. Elsewhere
/// interrupt and terminate have no equivalent and fall back to a kill.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTerminator;

#[cfg(unix)]
impl Terminator for PlatformTerminator {
    fn interrupt(&self, target: &TargetProcess) -> io::Result<()> {
        signal_group(target.pid(), libc::SIGINT)
    }

    fn terminate(&self, target: &TargetProcess) -> io::Result<()> {
        signal_group(target.pid(), libc::SIGTERM)
    }

    fn kill(&self, target: &TargetProcess) -> io::Result<()> {
        let sent = signal_group(target.pid(), libc::SIGKILL);
        if sent.is_err() {
            target.request_kill();
        }
        sent
    }

    fn sweep(&self, target: &TargetProcess) -> io::Result<()> {
        signal_group(target.pid(), libc::SIGKILL)
    }
}

#[cfg(not(unix))]
impl Terminator for PlatformTerminator {
    fn interrupt(&self, target: &TargetProcess) -> io::Result<()> {
        target.request_kill();
        Ok(())
    }

    fn terminate(&self, target: &TargetProcess) -> io::Result<()> {
        target.request_kill();
        Ok(())
    }

    fn kill(&self, target: &TargetProcess) -> io::Result<()> {
        target.request_kill();
        Ok(())
    }

    fn sweep(&self, _target: &TargetProcess) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bad pid {pid}")))?;
    // SAFETY: kill(2) takes plain integers and touches no memory. A negative
    // pid addresses the process group the target was spawned into.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Drives the three-step stop protocol.
#[derive(Debug, Clone)]
pub struct Escalator<T: Terminator> {
    terminator: T,
    window: Duration,
}

impl<T: Terminator> Escalator<T> {
    /// Escalator with the standard one-second window per step.
    #[must_use]
    pub fn new(terminator: T) -> Self {
        Self { terminator, window: ESCALATION_WINDOW }
    }

    /// Escalator with a custom window per step.
    #[must_use]
    pub fn with_window(terminator: T, window: Duration) -> Self {
        Self { terminator, window }
    }

    /// Kill the remains of a target whose leader already exited.
    ///
    /// Failures are logged; the group may already be empty.
    pub fn sweep(&self, target: &TargetProcess) {
        let pid = target.pid();
        match self.terminator.sweep(target) {
            Ok(()) => tracing::info!(pid, "killed processes left behind by the target"),
            Err(e) => tracing::debug!(pid, error = %e, "nothing left to sweep"),
        }
    }

    /// Stop `target`, escalating until it exits or the steps run out.
    ///
    /// Total wait is bounded by three windows. A step whose signal cannot
    /// be delivered is logged and its window still observed, since the
    /// target may already be exiting.
    pub async fn stop(&self, target: &mut TargetProcess) -> EscalationResult {
        let pid = target.pid();
        for step in EscalationStep::SEQUENCE {
            let sent = match step {
                EscalationStep::Interrupt => self.terminator.interrupt(target),
                EscalationStep::Terminate => self.terminator.terminate(target),
                EscalationStep::Kill => self.terminator.kill(target),
            };
            if let Err(e) = sent {
                tracing::warn!(pid, %step, error = %e, "stop signal not delivered");
            }

            if tokio::time::timeout(self.window, target.wait_exit()).await.is_ok() {
                tracing::info!(pid, %step, "target stopped");
                return EscalationResult::Exited { after: step };
            }
            tracing::debug!(pid, %step, window_ms = self.window.as_millis(), "target still alive");
        }

        tracing::warn!(pid, "target survived kill, leaving it for external cleanup");
        EscalationResult::Unresponsive
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::{Arc, Mutex};

    use tripwire_core::{CaseId, CrashSignatureSet, ResolvedCommand, DEFAULT_EXTRA_SIGNATURE};

    use super::*;
    use crate::launcher::{launch, InputDelivery};

    /// Records each step before forwarding it, or swallows it when `inert`.
    #[derive(Clone, Default)]
    struct Recording {
        steps: Arc<Mutex<Vec<EscalationStep>>>,
        inert: bool,
    }

    impl Recording {
        fn record(&self, step: EscalationStep) {
            self.steps.lock().expect("steps lock").push(step);
        }

        fn steps(&self) -> Vec<EscalationStep> {
            self.steps.lock().expect("steps lock").clone()
        }
    }

    impl Terminator for Recording {
        fn interrupt(&self, target: &TargetProcess) -> io::Result<()> {
            self.record(EscalationStep::Interrupt);
            if self.inert { Ok(()) } else { PlatformTerminator.interrupt(target) }
        }

        fn terminate(&self, target: &TargetProcess) -> io::Result<()> {
            self.record(EscalationStep::Terminate);
            if self.inert { Ok(()) } else { PlatformTerminator.terminate(target) }
        }

        fn kill(&self, target: &TargetProcess) -> io::Result<()> {
            self.record(EscalationStep::Kill);
            if self.inert { Ok(()) } else { PlatformTerminator.kill(target) }
        }

        fn sweep(&self, target: &TargetProcess) -> io::Result<()> {
            if self.inert { Ok(()) } else { PlatformTerminator.sweep(target) }
        }
    }

    async fn start(script: &str) -> TargetProcess {
        let command = ResolvedCommand {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
            artifact: None,
        };
        let signatures = Arc::new(CrashSignatureSet::with_extra(DEFAULT_EXTRA_SIGNATURE).expect("compile"));
        launch(CaseId::new(), &command, b"", &InputDelivery::Stdin, &signatures)
            .await
            .expect("launch")
    }

    #[test]
    fn sequence_is_interrupt_terminate_kill() {
        assert_eq!(
            EscalationStep::SEQUENCE,
            [EscalationStep::Interrupt, EscalationStep::Terminate, EscalationStep::Kill]
        );
    }

    #[tokio::test]
    async fn interruptible_target_stops_after_first_step() {
        let recording = Recording::default();
        let escalator = Escalator::with_window(recording.clone(), Duration::from_secs(2));
        let mut target = start("sleep 30").await;

        let result = escalator.stop(&mut target).await;
        assert_eq!(result, EscalationResult::Exited { after: EscalationStep::Interrupt });
        assert_eq!(recording.steps(), vec![EscalationStep::Interrupt]);
    }

    #[tokio::test]
    async fn target_ignoring_polite_signals_is_killed() {
        let recording = Recording::default();
        let escalator = Escalator::with_window(recording.clone(), Duration::from_millis(300));
        let mut target = start("trap '' INT TERM; sleep 30").await;
        // Let the shell install its traps before the first signal.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = escalator.stop(&mut target).await;
        assert_eq!(result, EscalationResult::Exited { after: EscalationStep::Kill });
        assert_eq!(recording.steps(), EscalationStep::SEQUENCE.to_vec());
    }

    #[tokio::test]
    async fn exhausted_escalation_reports_unresponsive() {
        let recording = Recording { inert: true, ..Recording::default() };
        let escalator = Escalator::with_window(recording.clone(), Duration::from_millis(100));
        let mut target = start("sleep 30").await;

        let result = escalator.stop(&mut target).await;
        assert_eq!(result, EscalationResult::Unresponsive);
        assert_eq!(recording.steps().len(), 3);

        target.request_kill();
        target.wait_exit().await;
    }
}
