//! Git adapter for the gate.
//!
//! Only plumbing commands are used and none of them write to the repository:
//! staged content is exported with `checkout-index --prefix`, and committed
//! content goes through a throwaway index file so the real index is never
//! touched.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Absolute path of the repository's top-level directory.
    #[instrument(skip_all)]
    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        let root = PathBuf::from(out.trim());
        debug!(root = %root.display(), "repository root");
        Ok(root)
    }

    /// True if `HEAD` resolves to a commit (false on an unborn branch).
    pub fn has_head(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])?;
        Ok(out.status.success())
    }

    /// Paths added, copied, modified or renamed in the index relative to `HEAD`.
    #[instrument(skip_all)]
    pub fn staged_changes(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&[
            "diff",
            "--cached",
            "--name-only",
            "--diff-filter=ACMR",
            "--no-renames",
            "-z",
        ])?;
        let files: Vec<String> = parse_nul_separated(&out);
        debug!(count = files.len(), "staged changes");
        Ok(files)
    }

    /// Write every file of the index beneath `dest`.
    #[instrument(skip_all, fields(dest = %dest.display()))]
    pub fn export_index(&self, dest: &Path) -> Result<()> {
        let prefix = dir_prefix(dest);
        self.run_checked(&["checkout-index", "--all", "--force", &prefix])?;
        Ok(())
    }

    /// Write every file of `rev` beneath `dest`, using `scratch_index` as the
    /// index file so the repository's own index stays untouched.
    #[instrument(skip_all, fields(rev = %rev, dest = %dest.display()))]
    pub fn export_revision(&self, rev: &str, dest: &Path, scratch_index: &Path) -> Result<()> {
        let env = [("GIT_INDEX_FILE", scratch_index.as_os_str())];
        self.run_checked_with_env(&["read-tree", rev], &env)?;
        let prefix = dir_prefix(dest);
        self.run_checked_with_env(&["checkout-index", "--all", "--force", &prefix], &env)?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        self.run_checked_with_env(args, &[])
    }

    fn run_checked_with_env(&self, args: &[&str], env: &[(&str, &OsStr)]) -> Result<Output> {
        let output = self.run_with_env(args, env)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        self.run_with_env(args, &[])
    }

    fn run_with_env(&self, args: &[&str], env: &[(&str, &OsStr)]) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// `--prefix=` argument for `checkout-index`; the trailing slash makes git
/// treat it as a directory.
fn dir_prefix(dest: &Path) -> String {
    let mut prefix = format!("--prefix={}", dest.display());
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

fn parse_nul_separated(out: &str) -> Vec<String> {
    out.split('\0')
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
