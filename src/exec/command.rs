// src/exec/command.rs

//! One-shot subprocess invocation with captured output.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{Result, ServeError};

/// Bytes of stderr kept for failure reports and classification.
pub const STDERR_TAIL_LIMIT: usize = 50_000;

/// A subprocess that exited unsuccessfully.
///
/// This is the only signal the core gets from the toolchain and from the
/// workload binary: the exit status plus whatever the process wrote to stderr.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{command} failed{}:\n{stderr_tail}", exit_suffix(.code))]
pub struct ProcessFailure {
    pub command: String,
    pub code: Option<i32>,
    pub stderr_tail: String,
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

/// Program, arguments and environment for one subprocess.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
    /// Written to the process's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Run through the platform shell, the way auxiliary commands are configured.
    pub fn shell(line: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(line)
        } else {
            Self::new("sh").arg("-c").arg(line)
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Output of a subprocess that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `spec` to completion, capturing stdout and stderr.
///
/// A non-zero exit becomes [`ServeError::Process`] carrying the stderr tail.
pub async fn run_captured(spec: &CommandSpec) -> Result<CommandOutput> {
    info!(cmd = %spec, "running command");

    let mut cmd = spec.to_command();
    cmd.stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    if let (Some(input), Some(mut pipe)) = (spec.stdin.as_deref(), child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        // Dropping the pipe closes stdin.
    }
    let output = child.wait_with_output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    debug!(
        cmd = %spec,
        exit_code = ?output.status.code(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "command exited"
    );

    if !output.status.success() {
        let mut tail = TailBuffer::new(STDERR_TAIL_LIMIT);
        tail.push(stderr.as_bytes());
        return Err(ServeError::Process(ProcessFailure {
            command: spec.to_string(),
            code: output.status.code(),
            stderr_tail: tail.into_string(),
        }));
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Bounded buffer that keeps only the last `limit` bytes written to it.
#[derive(Debug)]
pub struct TailBuffer {
    buf: VecDeque<u8>,
    limit: usize,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(limit.min(8192)),
            limit,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let bytes = if bytes.len() > self.limit {
            &bytes[bytes.len() - self.limit..]
        } else {
            bytes
        };
        let overflow = (self.buf.len() + bytes.len()).saturating_sub(self.limit);
        self.buf.drain(..overflow);
        self.buf.extend(bytes);
    }

    pub fn into_string(self) -> String {
        let bytes: Vec<u8> = self.buf.into();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Drain `reader` into a [`TailBuffer`], mirroring each chunk to `echo` when set.
pub(crate) async fn drain_into_tail<R>(
    mut reader: R,
    limit: usize,
    mut echo: Option<Box<dyn std::io::Write + Send>>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = TailBuffer::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Some(out) = echo.as_mut() {
                    let _ = out.write_all(&chunk[..n]);
                }
                tail.push(&chunk[..n]);
            }
        }
    }
    tail.into_string()
}
