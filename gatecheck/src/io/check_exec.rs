//! Check execution.
//!
//! A check is invoked as `<command...> <newPath> <oldPath>` from inside the
//! checks directory, with that directory prepended to `PATH` so checks can be
//! named as bare executables. `oldPath` is the empty string when the file has
//! no prior version. Working directory and search path are set on the child
//! only; the gate's own environment is never modified.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::CheckResult;
use crate::io::interrupt::AbortFlag;
use crate::io::process::{WaitPolicy, run_command};

/// Parameters for one check process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Command line after catalog lookup, split with shell quoting rules.
    pub command: String,
    /// Repository-relative path of the file under check.
    pub file: String,
    pub new_path: PathBuf,
    pub old_path: Option<PathBuf>,
    /// Extra environment for the process.
    pub env: BTreeMap<String, String>,
}

impl CheckRequest {
    /// Same command and environment, different content paths.
    pub fn with_paths(&self, new_path: PathBuf, old_path: Option<PathBuf>) -> Self {
        Self {
            new_path,
            old_path,
            ..self.clone()
        }
    }
}

/// Abstraction over check execution backends.
pub trait CheckRunner {
    /// Run one check. `Err` means the gate could not run it at all; a check
    /// that ran and failed is an `Ok` with `passed == false`.
    fn run(&self, request: &CheckRequest) -> Result<CheckResult>;
}

/// Runs checks as child processes.
#[derive(Debug, Clone)]
pub struct ProcessCheckRunner {
    checks_dir: PathBuf,
    search_path: OsString,
    policy: WaitPolicy,
}

impl ProcessCheckRunner {
    pub fn new(
        checks_dir: impl Into<PathBuf>,
        slow_warning: Duration,
        abort: AbortFlag,
    ) -> Result<Self> {
        let checks_dir = checks_dir.into();
        let search_path = search_path_with(&checks_dir, env::var_os("PATH"))?;
        Ok(Self {
            checks_dir,
            search_path,
            policy: WaitPolicy {
                slow_warning,
                abort,
            },
        })
    }
}

impl CheckRunner for ProcessCheckRunner {
    #[instrument(skip_all, fields(command = %request.command))]
    fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
        let words = shell_words::split(&request.command)
            .with_context(|| format!("parse check command '{}'", request.command))?;
        let (program, args) = words
            .split_first()
            .ok_or_else(|| anyhow!("empty check command"))?;

        if !self.checks_dir.is_dir() {
            return Err(anyhow!(
                "checks directory {} does not exist",
                self.checks_dir.display()
            ));
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&request.new_path)
            .arg(request.old_path.as_deref().unwrap_or(Path::new("")))
            .current_dir(&self.checks_dir)
            .env("PATH", &self.search_path)
            .envs(&request.env);

        let output = match run_command(cmd, program, &self.policy) {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => {
                warn!(program = %program, "check executable not found");
                return Ok(CheckResult::not_found(format!(
                    "{program}: command not found"
                )));
            }
            Err(err) => return Err(err),
        };

        if output.interrupted {
            return Ok(CheckResult::errored(format!("{program}: interrupted")));
        }

        let result = CheckResult::from_exit(
            output.exit_code(),
            output.stdout_lossy(),
            &output.stderr_lossy(),
        );
        debug!(passed = result.passed, exit_code = ?result.exit_code, "check finished");
        Ok(result)
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}

/// `checks_dir` followed by the entries of `ambient`.
pub fn search_path_with(checks_dir: &Path, ambient: Option<OsString>) -> Result<OsString> {
    let mut entries = vec![checks_dir.to_path_buf()];
    if let Some(ambient) = ambient {
        entries.extend(env::split_paths(&ambient));
    }
    env::join_paths(entries).context("build check search path")
}
