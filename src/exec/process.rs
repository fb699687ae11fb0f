// src/exec/process.rs

//! Long-lived subprocesses tied to a cancellation token.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::{drain_into_tail, CommandSpec, ProcessFailure, STDERR_TAIL_LIMIT};
use crate::errors::{Result, ServeError};

/// How long a process gets to exit after SIGTERM before it is killed.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for stderr to reach EOF once the process has exited.
/// A grandchild that inherited the pipe can keep it open indefinitely.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A spawned process whose stderr is being collected in the background.
#[derive(Debug)]
pub struct RunningProcess {
    name: String,
    command: String,
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
}

/// Spawn `spec` as a long-lived process.
///
/// With `echo` set, the process's stdout and stderr are mirrored to ours;
/// either way the last [`STDERR_TAIL_LIMIT`] bytes of stderr are kept for
/// classification.
pub fn spawn_process(name: &str, spec: &CommandSpec, echo: bool) -> Result<RunningProcess> {
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(if echo { Stdio::inherit() } else { Stdio::null() })
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    info!(process = %name, pid = ?child.id(), cmd = %spec, "spawned process");

    let stderr_task = child.stderr.take().map(|stderr| {
        let sink: Option<Box<dyn std::io::Write + Send>> = if echo {
            Some(Box::new(std::io::stderr()))
        } else {
            None
        };
        tokio::spawn(drain_into_tail(stderr, STDERR_TAIL_LIMIT, sink))
    });

    Ok(RunningProcess {
        name: name.to_string(),
        command: spec.to_string(),
        child,
        stderr_task,
    })
}

impl RunningProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit or for `cancel` to fire.
    ///
    /// - clean exit: `Ok(())`
    /// - non-zero exit: [`ServeError::Process`] with the stderr tail
    /// - cancellation: the process is terminated and awaited, then
    ///   [`ServeError::Cancelled`] is returned
    pub async fn supervise(mut self, cancel: CancellationToken) -> Result<()> {
        tokio::select! {
            status = self.child.wait() => {
                let status = status?;
                let stderr_tail = self.collect_stderr().await;
                debug!(process = %self.name, exit_code = ?status.code(), "process exited");

                if status.success() {
                    Ok(())
                } else {
                    Err(ServeError::Process(ProcessFailure {
                        command: self.command.clone(),
                        code: status.code(),
                        stderr_tail,
                    }))
                }
            }

            _ = cancel.cancelled() => {
                info!(process = %self.name, "cancellation requested; stopping process");
                self.terminate().await;
                Err(ServeError::Cancelled)
            }
        }
    }

    /// SIGTERM, then SIGKILL once [`TERMINATION_GRACE`] has passed.
    ///
    /// Always waits for the process to be reaped.
    pub async fn terminate(&mut self) {
        send_sigterm(&self.child, &self.name);

        match tokio::time::timeout(TERMINATION_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(process = %self.name, exit_code = ?status.code(), "process stopped");
            }
            Ok(Err(e)) => {
                warn!(process = %self.name, error = %e, "failed waiting for process to stop");
            }
            Err(_) => {
                warn!(process = %self.name, "process did not exit after SIGTERM; killing it");
                if let Err(e) = self.child.kill().await {
                    warn!(process = %self.name, error = %e, "failed to kill process");
                }
            }
        }

        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
    }

    async fn collect_stderr(&mut self) -> String {
        let Some(handle) = self.stderr_task.take() else {
            return String::new();
        };
        match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                debug!(process = %self.name, "stderr still open after exit; giving up on it");
                String::new()
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child, name: &str) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(process = %name, pid, error = %err, "failed to send SIGTERM"),
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &Child, name: &str) {
    // No graceful signal here; the grace timeout falls through to kill().
    debug!(process = %name, pid = ?child.id(), "SIGTERM unavailable on this platform");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_exit_is_ok() {
        let proc = spawn_process("ok", &CommandSpec::shell("exit 0"), false).unwrap();
        proc.supervise(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn failing_exit_reports_stderr_tail() {
        let proc = spawn_process(
            "bad",
            &CommandSpec::shell("echo 'listen tcp :1: bind: address already in use' >&2; exit 1"),
            false,
        )
        .unwrap();

        match proc.supervise(CancellationToken::new()).await {
            Err(ServeError::Process(failure)) => {
                assert_eq!(failure.code, Some(1));
                assert!(failure.stderr_tail.contains("address already in use"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_terminates_process() {
        let proc = spawn_process("sleeper", &CommandSpec::shell("sleep 30"), false).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let res = proc.supervise(cancel).await;
        assert!(matches!(res, Err(ServeError::Cancelled)));
        assert!(started.elapsed() < TERMINATION_GRACE);
    }

    #[tokio::test]
    async fn terminate_delivers_sigterm_to_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stopped");
        let script = format!(
            "trap 'touch \"{}\"; exit 0' TERM; sleep 30 & wait",
            marker.display()
        );
        let mut proc = spawn_process("trapper", &CommandSpec::shell(&script), false).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        proc.terminate().await;
        assert!(marker.exists(), "TERM trap did not run");
    }
}
