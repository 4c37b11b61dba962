//! Shared deterministic types for gate core logic.
//!
//! These types define stable contracts between the resolver, the executors and
//! the aggregator. They do not touch the filesystem.

use std::path::PathBuf;

use serde::Serialize;

/// Leading word that wraps a check in differential ("no-new") mode.
pub const NO_NEW_PREFIX: &str = "no-new";

/// Repository-relative paths staged for commit (added, copied, modified or
/// renamed), in discovery order and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<String>,
}

impl ChangeSet {
    /// Build a change set, dropping empty entries and repeated paths while
    /// keeping first-seen order.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            let path = path.trim_start_matches("./").to_string();
            if path.is_empty() || files.contains(&path) {
                continue;
            }
            files.push(path);
        }
        Self { files }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// A check command as written in a rule, split into its differential flag and
/// the inner check name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    /// The command text exactly as declared, used for reporting.
    pub declared: String,
    /// The command to execute (without the `no-new` wrapper).
    pub inner: String,
    /// Whether pre-existing violations are suppressed.
    pub no_new: bool,
}

impl CheckSpec {
    pub fn parse(declared: &str) -> Self {
        let declared = declared.trim();
        let inner = declared
            .strip_prefix(NO_NEW_PREFIX)
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(str::trim);
        match inner {
            Some(inner) if !inner.is_empty() => Self {
                declared: declared.to_string(),
                inner: inner.to_string(),
                no_new: true,
            },
            _ => Self {
                declared: declared.to_string(),
                inner: declared.to_string(),
                no_new: false,
            },
        }
    }
}

/// One (file, check) pair produced by resolution, before any snapshot exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCheck {
    pub file: String,
    pub check: CheckSpec,
}

/// A fully bound invocation: the check plus the snapshot paths it receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInvocation {
    pub check: CheckSpec,
    pub file: String,
    pub new_path: PathBuf,
    /// `None` when the file has no prior committed version in the run.
    pub old_path: Option<PathBuf>,
}

/// Outcome of a single check invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub passed: bool,
    /// All of stdout, then all of stderr. The two streams are captured
    /// separately, so lines are not interleaved in the order they were written.
    pub output: String,
    /// Captured stdout alone; the source of violation lines.
    #[serde(skip)]
    pub stdout: String,
    pub exit_code: Option<i32>,
    /// The check executable could not be resolved (exit status 127).
    pub not_found: bool,
}

/// Exit status a shell reports for an unresolvable command.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

impl CheckResult {
    /// Classify a finished process by its exit status. `output` is `stdout`
    /// followed by `stderr`, with a newline between them if stdout lacks one.
    pub fn from_exit(exit_code: Option<i32>, stdout: String, stderr: &str) -> Self {
        let mut output = stdout.clone();
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(stderr);
        }
        Self {
            passed: exit_code == Some(0),
            output,
            stdout,
            exit_code,
            not_found: exit_code == Some(NOT_FOUND_EXIT_CODE),
        }
    }

    /// The executable could not be spawned at all.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: message.into(),
            stdout: String::new(),
            exit_code: Some(NOT_FOUND_EXIT_CODE),
            not_found: true,
        }
    }

    /// The check could not be completed for a reason other than its own verdict.
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: message.into(),
            stdout: String::new(),
            exit_code: None,
            not_found: false,
        }
    }
}

/// Overall pass/fail decision for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}
