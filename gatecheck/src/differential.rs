//! Differential ("no-new") checking.
//!
//! The inner check runs once against the new content and once against the old
//! content. Only stdout lines that appear in the new run and not in the old run
//! count as violations; the inner exit status is ignored.
//!
//! The two runs see the file under different snapshot roots. Before comparing,
//! each run's root prefix is stripped from its output, so a check that echoes
//! the path it was given reports `pkg/a.py:3: ...` in both runs.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::CheckResult;
use crate::core::violations::ViolationSet;
use crate::io::check_exec::{CheckRequest, CheckRunner};

/// Wraps a runner so that pre-existing violations are suppressed.
#[derive(Debug)]
pub struct NoNew<'a, R: ?Sized> {
    inner: &'a R,
}

impl<'a, R: CheckRunner + ?Sized> NoNew<'a, R> {
    pub fn new(inner: &'a R) -> Self {
        Self { inner }
    }

    /// Run the inner check against one content path, with an empty old path.
    fn run_against(&self, request: &CheckRequest, path: &Path) -> Result<CheckResult> {
        self.inner.run(&request.with_paths(path.to_path_buf(), None))
    }
}

/// Violations of one run with its snapshot root removed from every line.
fn violations_of(run: &CheckResult, path: &Path, file: &str) -> ViolationSet {
    match snapshot_root(path, file) {
        Some(root) => ViolationSet::from_output(&run.stdout.replace(&root, "")),
        None => ViolationSet::from_output(&run.stdout),
    }
}

/// The directory prefix (with trailing separator) that `path` adds to `file`.
fn snapshot_root(path: &Path, file: &str) -> Option<String> {
    let root = path.to_str()?.strip_suffix(file)?;
    (root.ends_with('/') && root.len() > 1).then(|| root.to_string())
}

impl<R: CheckRunner + ?Sized> CheckRunner for NoNew<'_, R> {
    #[instrument(
        skip_all,
        fields(
            command = %request.command,
            file = %request.file,
            has_old = request.old_path.is_some()
        )
    )]
    fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
        let new_run = self.run_against(request, &request.new_path)?;
        if let Some(result) = unusable(&new_run) {
            return Ok(result);
        }
        let current = violations_of(&new_run, &request.new_path, &request.file);

        let baseline = match &request.old_path {
            Some(old_path) => {
                let old_run = self.run_against(request, old_path)?;
                if let Some(result) = unusable(&old_run) {
                    return Ok(result);
                }
                violations_of(&old_run, old_path, &request.file)
            }
            None => ViolationSet::default(),
        };

        let introduced = current.difference(&baseline);
        debug!(
            current = current.len(),
            baseline = baseline.len(),
            introduced = introduced.len(),
            "violation sets compared"
        );
        Ok(differential_result(&introduced))
    }
}

/// A run that cannot be compared: the executable is missing, or the process
/// did not exit on its own.
fn unusable(run: &CheckResult) -> Option<CheckResult> {
    if run.not_found || (!run.passed && run.exit_code.is_none()) {
        Some(run.clone())
    } else {
        None
    }
}

fn differential_result(introduced: &ViolationSet) -> CheckResult {
    if introduced.is_empty() {
        return CheckResult::from_exit(Some(0), String::new(), "");
    }
    let mut stdout = introduced.lines().join("\n");
    stdout.push('\n');
    CheckResult::from_exit(Some(1), stdout, "")
}
