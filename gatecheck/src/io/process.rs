//! Helpers for running check processes without pipe deadlocks.
//!
//! Checks are never killed for running long; a slow check only produces a
//! warning. A raised [`AbortFlag`] kills the child and marks the output as
//! interrupted.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use super::interrupt::AbortFlag;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    /// `None` when the child was killed because of an abort.
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub interrupted: bool,
}

impl CommandOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Wait policy for [`run_command`].
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Emit a warning once the child has run this long.
    pub slow_warning: Duration,
    pub abort: AbortFlag,
}

/// Run a command to completion, reading stdout/stderr concurrently.
///
/// Spawn failures are returned as errors with the underlying
/// [`std::io::Error`] still reachable through `downcast_ref`.
#[instrument(skip_all, fields(label = %label, slow_warning_secs = policy.slow_warning.as_secs()))]
pub fn run_command(mut cmd: Command, label: &str, policy: &WaitPolicy) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().with_context(|| format!("spawn {label}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let started = Instant::now();
    let mut warned = false;
    let mut interrupted = false;
    let status = loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).context("wait for command")? {
            break Some(status);
        }
        if policy.abort.is_raised() {
            warn!(label, "abort requested, killing check");
            interrupted = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?;
            break None;
        }
        if !warned && started.elapsed() >= policy.slow_warning {
            warn!(
                label,
                elapsed_secs = started.elapsed().as_secs(),
                "command is taking a long time to complete"
            );
            warned = true;
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.and_then(|s| s.code()), interrupted, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        interrupted,
    })
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}
