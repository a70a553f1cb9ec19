//! Target process launch and input delivery.
//!
//! [`launch`] writes the input artifact (file mode), spawns the target with
//! both output streams piped, and starts the per-case tasks: two stream
//! monitors, an exit watcher, and in stdin mode an input writer. The
//! returned [`TargetProcess`] holds every receiver the supervisor races on.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tripwire_core::{CaseId, CrashSignatureSet, ResolvedCommand, Stream};

use crate::monitor::{spawn_monitor, ScanVerdict};
use crate::CaseError;

/// How a case's input bytes reach the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDelivery {
    /// Written to the target's standard input, which is then closed.
    Stdin,
    /// Written to a unique file in `dir`, whose path replaces `{{.File}}`.
    /// Standard input is closed from the start.
    File {
        /// Artifact directory.
        dir: PathBuf,
        /// Keep artifacts after the case instead of removing them.
        retain: bool,
    },
}

/// An input file written for one case. Removed on drop unless retained.
#[derive(Debug)]
pub(crate) struct InputArtifact {
    path: PathBuf,
    retain: bool,
}

impl InputArtifact {
    async fn write(path: &Path, input: &[u8], retain: bool) -> Result<Self, CaseError> {
        tokio::fs::write(path, input)
            .await
            .map_err(|source| CaseError::InputWrite {
                destination: path.display().to_string(),
                source,
            })?;
        Ok(Self { path: path.to_owned(), retain })
    }
}

impl Drop for InputArtifact {
    fn drop(&mut self) {
        if self.retain {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "input artifact not removed");
        }
    }
}

/// A running target and the single-use reports of its case tasks.
///
/// Dropping it aborts every case task and removes the input artifact. The
/// exit watcher owns the `Child`, so aborting it kills a target that is
/// still running.
#[derive(Debug)]
pub struct TargetProcess {
    pub(crate) pid: u32,
    pub(crate) exited: bool,
    pub(crate) exit: oneshot::Receiver<io::Result<ExitStatus>>,
    pub(crate) stdout: oneshot::Receiver<ScanVerdict>,
    pub(crate) stderr: oneshot::Receiver<ScanVerdict>,
    pub(crate) input: oneshot::Receiver<io::Result<()>>,
    kill: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
    _artifact: Option<InputArtifact>,
}

impl TargetProcess {
    /// OS process id of the target. On Unix also its process group id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the exit watcher to kill the target forcefully.
    pub fn request_kill(&self) {
        self.kill.notify_one();
    }

    /// Wait until the exit watcher reports. Returns at once if it already has.
    pub(crate) async fn wait_exit(&mut self) {
        if self.exited {
            return;
        }
        let report = (&mut self.exit).await;
        self.exited = true;
        log_exit(self.pid, report);
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub(crate) fn log_exit(pid: u32, report: Result<io::Result<ExitStatus>, oneshot::error::RecvError>) {
    match report {
        Ok(Ok(status)) => tracing::debug!(pid, %status, "target exited"),
        Ok(Err(e)) => tracing::warn!(pid, error = %e, "waiting for target failed"),
        Err(_) => tracing::debug!(pid, "exit watcher ended without a report"),
    }
}

/// Start the target for one case.
///
/// # Errors
/// Returns [`CaseError::InputWrite`] if the artifact cannot be written,
/// [`CaseError::Start`] if the process cannot be spawned, and
/// [`CaseError::Pipe`] if a standard stream is missing. No process is left
/// running on any error path.
pub(crate) async fn launch(
    case_id: CaseId,
    command: &ResolvedCommand,
    input: &[u8],
    delivery: &InputDelivery,
    signatures: &Arc<CrashSignatureSet>,
) -> Result<TargetProcess, CaseError> {
    let artifact = match (delivery, &command.artifact) {
        (InputDelivery::File { retain, .. }, Some(path)) => {
            Some(InputArtifact::write(path, input, *retain).await?)
        }
        _ => None,
    };
    let use_stdin = matches!(delivery, InputDelivery::Stdin);

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(if use_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start_err = |source: io::Error| CaseError::Start {
        program: command.program.clone(),
        source,
    };
    let mut child = cmd.spawn().map_err(start_err)?;
    let pid = child
        .id()
        .ok_or_else(|| start_err(io::Error::other("target exited before its pid was read")))?;

    tracing::info!(case_id = %case_id, pid, %command, "target started");

    let stdout = child.stdout.take().ok_or(CaseError::Pipe { stream: "stdout" })?;
    let stderr = child.stderr.take().ok_or(CaseError::Pipe { stream: "stderr" })?;
    let stdin = if use_stdin {
        Some(child.stdin.take().ok_or(CaseError::Pipe { stream: "stdin" })?)
    } else {
        None
    };

    let (stdout_rx, stdout_task) = spawn_monitor(stdout, Stream::Stdout, Arc::clone(signatures));
    let (stderr_rx, stderr_task) = spawn_monitor(stderr, Stream::Stderr, Arc::clone(signatures));
    let mut tasks = vec![stdout_task, stderr_task];

    let (input_tx, input_rx) = oneshot::channel();
    match stdin {
        Some(stdin) => tasks.push(spawn_input_writer(stdin, input.to_vec(), input_tx)),
        None => {
            let _ = input_tx.send(Ok(()));
        }
    }

    let kill = Arc::new(Notify::new());
    let (exit, watcher) = spawn_exit_watcher(child, Arc::clone(&kill));
    tasks.push(watcher);

    Ok(TargetProcess {
        pid,
        exited: false,
        exit,
        stdout: stdout_rx,
        stderr: stderr_rx,
        input: input_rx,
        kill,
        tasks,
        _artifact: artifact,
    })
}

/// Write the input to stdin and close it, reporting the write result.
fn spawn_input_writer(
    mut stdin: ChildStdin,
    input: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut result = stdin.write_all(&input).await;
        if result.is_ok() {
            result = stdin.shutdown().await;
        }
        drop(stdin);
        let _ = done.send(result);
    })
}

/// Own the child until it exits; kill it when asked.
fn spawn_exit_watcher(
    mut child: Child,
    kill: Arc<Notify>,
) -> (oneshot::Receiver<io::Result<ExitStatus>>, JoinHandle<()>) {
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let finished = tokio::select! {
            status = child.wait() => Some(status),
            () = kill.notified() => None,
        };
        let status = match finished {
            Some(status) => status,
            None => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "kill request on a finished target");
                }
                child.wait().await
            }
        };
        let _ = tx.send(status);
    });
    (rx, handle)
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use tripwire_core::DEFAULT_EXTRA_SIGNATURE;

    fn signatures() -> Arc<CrashSignatureSet> {
        Arc::new(CrashSignatureSet::with_extra(DEFAULT_EXTRA_SIGNATURE).expect("compile"))
    }

    fn sh(script: &str) -> ResolvedCommand {
        ResolvedCommand {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
            artifact: None,
        }
    }

    #[tokio::test]
    async fn stdin_input_reaches_the_target() {
        let mut target = launch(
            CaseId::new(),
            &sh(r#"read line; echo "got $line""#),
            b"fatal input\n",
            &InputDelivery::Stdin,
            &signatures(),
        )
        .await
        .expect("launch");

        match (&mut target.stdout).await {
            Ok(ScanVerdict::Matched(m)) => assert_eq!(m.line, "got fatal input"),
            other => panic!("expected echoed input to match, got {other:?}"),
        }
        target.wait_exit().await;
        assert!(target.exited);
    }

    #[tokio::test]
    async fn missing_program_is_a_start_error() {
        let command = ResolvedCommand {
            program: "./definitely-not-a-real-target-8d1f".to_owned(),
            args: Vec::new(),
            artifact: None,
        };
        let err = launch(CaseId::new(), &command, b"", &InputDelivery::Stdin, &signatures())
            .await
            .expect_err("must fail");
        assert!(matches!(err, CaseError::Start { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn artifact_is_removed_on_drop_unless_retained() {
        let dir = tempfile::tempdir().expect("temp dir");
        for retain in [false, true] {
            let path = dir.path().join(format!("case-{retain}"));
            let mut command = sh("true");
            command.artifact = Some(path.clone());
            let delivery = InputDelivery::File { dir: dir.path().to_owned(), retain };

            let mut target = launch(CaseId::new(), &command, b"bytes", &delivery, &signatures())
                .await
                .expect("launch");
            assert_eq!(std::fs::read(&path).expect("artifact written"), b"bytes");
            target.wait_exit().await;
            drop(target);
            assert_eq!(path.exists(), retain, "retain={retain}");
        }
    }

    #[tokio::test]
    async fn kill_request_stops_the_target() {
        let mut target = launch(CaseId::new(), &sh("sleep 30"), b"", &InputDelivery::Stdin, &signatures())
            .await
            .expect("launch");
        target.request_kill();
        tokio::time::timeout(Duration::from_secs(5), target.wait_exit())
            .await
            .expect("target must exit after a kill request");
    }
}
