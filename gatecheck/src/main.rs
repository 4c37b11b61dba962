//! Pre-commit gate.
//!
//! Resolves the checks declared in per-directory rule files for every staged
//! file, runs them against a snapshot of the staged content and rejects the
//! commit when any of them fails. Meant to be called from `.git/hooks/pre-commit`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use gatecheck::core::types::{ChangeSet, Verdict};
use gatecheck::exit_codes;
use gatecheck::gate::{plan_checks, run_gate};
use gatecheck::io::check_exec::ProcessCheckRunner;
use gatecheck::io::config::load_config;
use gatecheck::io::git::Git;
use gatecheck::io::init::{GatePaths, InitOptions, init_gate};
use gatecheck::io::interrupt::AbortFlag;
use gatecheck::io::snapshot::GitSnapshotter;
use gatecheck::logging;
use gatecheck::report::{ReportFormat, render_human, render_json};

#[derive(Parser)]
#[command(
    name = "gatecheck",
    version,
    about = "Pre-commit gate that runs per-file checks from rule files"
)]
struct Cli {
    /// Repository to operate on (defaults to the one containing the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the staged changes; exits 1 if any check fails.
    Run {
        /// Number of checks to run concurrently (overrides the config).
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Report format.
        #[arg(long, value_enum, default_value_t = ReportFormat::Human)]
        format: ReportFormat,
    },
    /// Print the checks that apply to FILES (repository-relative), or to the
    /// staged changes when no files are given.
    Resolve { files: Vec<String> },
    /// Create `.gatecheck/config.toml` and the checks directory.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("gatecheck: {:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = repo_root(cli.repo.as_deref())?;
    debug!(root = %root.display(), "repository root");
    match cli.command {
        Command::Run { jobs, format } => cmd_run(&root, jobs, format),
        Command::Resolve { files } => cmd_resolve(&root, files),
        Command::Init { force } => cmd_init(&root, force),
    }
}

fn repo_root(repo: Option<&Path>) -> Result<PathBuf> {
    let start = match repo {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("read current directory")?,
    };
    Git::new(start)
        .toplevel()
        .context("locate repository root")
}

fn cmd_run(root: &Path, jobs: Option<usize>, format: ReportFormat) -> Result<i32> {
    let mut config = load_config(&GatePaths::new(root).config_path)?;
    if let Some(jobs) = jobs {
        config.jobs = jobs;
        config.validate().context("validate --jobs")?;
    }

    let abort = AbortFlag::new();
    abort.install_sigint()?;

    let git = Git::new(root);
    let changes = ChangeSet::new(git.staged_changes()?);
    let runner = ProcessCheckRunner::new(
        config.checks_dir_in(root),
        Duration::from_secs(config.slow_check_warning_secs),
        abort.clone(),
    )?;
    let snapshotter = GitSnapshotter::new(git);

    let outcome = run_gate(root, &config, &changes, &snapshotter, &runner, &abort)?;
    match format {
        ReportFormat::Human => eprint!("{}", render_human(&outcome, &config)),
        ReportFormat::Json => println!("{}", render_json(&outcome)?),
    }
    Ok(exit_code_for(outcome.verdict()))
}

fn cmd_resolve(root: &Path, files: Vec<String>) -> Result<i32> {
    let config = load_config(&GatePaths::new(root).config_path)?;
    let changes = if files.is_empty() {
        ChangeSet::new(Git::new(root).staged_changes()?)
    } else {
        ChangeSet::new(files)
    };
    for planned in plan_checks(root, &config, &changes)? {
        println!("{}\t{}", planned.file, planned.check.declared);
    }
    Ok(exit_codes::OK)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let report = init_gate(root, &InitOptions { force })?;
    let config_path = GatePaths::new(root).config_path;
    if report.config_written {
        println!("wrote {}", config_path.display());
    } else {
        println!("kept existing {}", config_path.display());
    }
    println!("checks directory: {}", report.checks_dir.display());
    Ok(exit_codes::OK)
}

fn exit_code_for(verdict: Verdict) -> i32 {
    match verdict {
        Verdict::Pass => exit_codes::OK,
        Verdict::Fail => exit_codes::FAILED,
    }
}
