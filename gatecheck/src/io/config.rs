//! Gate configuration stored under `.gatecheck/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::CheckSpec;

pub const DEFAULT_INSTALL_HINT: &str =
    "the check executable was not found; run the dependency install step for your checks";

/// Gate configuration (TOML).
///
/// Missing fields default to values that work for a repository with a
/// `.gatecheck/checks` directory and `PRECOMMIT` rule files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Directory holding check executables, relative to the repository root.
    pub checks_dir: PathBuf,

    /// File name looked up in every directory for rules.
    pub rule_file: String,

    /// Number of checks run concurrently.
    pub jobs: usize,

    /// Warn when a single check runs longer than this many seconds.
    pub slow_check_warning_secs: u64,

    /// Printed under checks whose executable could not be found.
    pub install_hint: String,

    /// Named checks: rule commands that match a key here run `command` instead.
    pub checks: BTreeMap<String, CheckEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckEntry {
    /// Command line to run; defaults to the check name itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Printed under failures of this check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Extra environment for the check process.
    pub env: BTreeMap<String, String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            checks_dir: PathBuf::from(".gatecheck").join("checks"),
            rule_file: "PRECOMMIT".to_string(),
            jobs: 1,
            slow_check_warning_secs: 10,
            install_hint: DEFAULT_INSTALL_HINT.to_string(),
            checks: BTreeMap::new(),
        }
    }
}

/// A check after catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub command: String,
    pub env: BTreeMap<String, String>,
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(anyhow!("jobs must be > 0"));
        }
        if self.slow_check_warning_secs == 0 {
            return Err(anyhow!("slow_check_warning_secs must be > 0"));
        }
        let name = self.rule_file.trim();
        if name.is_empty() || name.contains('/') {
            return Err(anyhow!("rule_file must be a plain file name"));
        }
        for (name, entry) in &self.checks {
            if let Some(command) = &entry.command
                && command.trim().is_empty()
            {
                return Err(anyhow!("checks.{name}.command must not be empty"));
            }
        }
        Ok(())
    }

    /// Absolute checks directory for a repository root.
    pub fn checks_dir_in(&self, root: &Path) -> PathBuf {
        root.join(&self.checks_dir)
    }

    /// Map a rule's inner check through the catalog. Unknown names run as-is.
    pub fn resolve_command(&self, check: &CheckSpec) -> ResolvedCommand {
        match self.checks.get(&check.inner) {
            Some(entry) => ResolvedCommand {
                command: entry
                    .command
                    .clone()
                    .unwrap_or_else(|| check.inner.clone()),
                env: entry.env.clone(),
            },
            None => ResolvedCommand {
                command: check.inner.clone(),
                env: BTreeMap::new(),
            },
        }
    }

    /// Hint for a declared check string, if the catalog has one.
    pub fn hint_for(&self, declared: &str) -> Option<&str> {
        let spec = CheckSpec::parse(declared);
        self.checks
            .get(&spec.inner)
            .and_then(|entry| entry.hint.as_deref())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GateConfig::default()`.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        let cfg = GateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
