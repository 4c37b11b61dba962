//! Scaffolding for `.gatecheck/` in a repository.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{GateConfig, load_config, write_config};

/// Canonical paths within `.gatecheck/` for a repository root.
#[derive(Debug, Clone)]
pub struct GatePaths {
    pub root: PathBuf,
    pub gate_dir: PathBuf,
    pub config_path: PathBuf,
}

impl GatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let gate_dir = root.join(".gatecheck");
        Self {
            root,
            config_path: gate_dir.join("config.toml"),
            gate_dir,
        }
    }
}

/// Options for `init_gate`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// What `init_gate` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub config_written: bool,
    pub checks_dir: PathBuf,
}

/// Create `.gatecheck/config.toml` and the checks directory under `root`.
///
/// An existing config is left alone unless `options.force` is set. The checks
/// directory named by the resulting config is always created.
pub fn init_gate(root: &Path, options: &InitOptions) -> Result<InitReport> {
    let paths = GatePaths::new(root);
    if paths.gate_dir.exists() && !paths.gate_dir.is_dir() {
        return Err(anyhow!(
            "gatecheck init: {} exists but is not a directory",
            paths.gate_dir.display()
        ));
    }
    create_dir(&paths.gate_dir)?;

    let config_written = options.force || !paths.config_path.exists();
    let config = if config_written {
        let config = GateConfig::default();
        write_config(&paths.config_path, &config)?;
        info!(path = %paths.config_path.display(), "config written");
        config
    } else {
        load_config(&paths.config_path)?
    };

    let checks_dir = config.checks_dir_in(root);
    create_dir(&checks_dir)?;
    Ok(InitReport {
        config_written,
        checks_dir,
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
