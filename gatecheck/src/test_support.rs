//! Test-only helpers: throwaway git repositories and closure-backed runners.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::types::CheckResult;
use crate::io::check_exec::{CheckRequest, CheckRunner};

/// A git repository in a temporary directory, removed on drop.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// `git init` with a local identity so commits work on any machine.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "gatecheck@example.com"])?;
        repo.git(&["config", "user.name", "gatecheck tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Write a file relative to the repository root, creating parents.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn stage(&self, rel: &str) -> Result<()> {
        self.git(&["add", "--", rel])?;
        Ok(())
    }

    /// Write and stage in one go.
    pub fn write_staged(&self, rel: &str, contents: &str) -> Result<()> {
        self.write(rel, contents)?;
        self.stage(rel)
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "--quiet", "--no-verify", "-m", message])?;
        Ok(())
    }

    /// Write an executable `/bin/sh` script under the default checks directory.
    pub fn write_check(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.write(
            &format!(".gatecheck/checks/{name}"),
            &format!("#!/bin/sh\n{body}\n"),
        )?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("chmod {}", path.display()))?;
        Ok(path)
    }
}

/// [`CheckRunner`] backed by a closure.
pub struct FnCheckRunner<F> {
    run: F,
}

impl<F> FnCheckRunner<F>
where
    F: Fn(&CheckRequest) -> Result<CheckResult> + Sync,
{
    pub fn new(run: F) -> Self {
        Self { run }
    }
}

impl<F> CheckRunner for FnCheckRunner<F>
where
    F: Fn(&CheckRequest) -> Result<CheckResult> + Sync,
{
    fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
        (self.run)(request)
    }
}

/// A passing result with the given stdout.
pub fn passed(stdout: &str) -> CheckResult {
    CheckResult::from_exit(Some(0), stdout.to_string(), "")
}
