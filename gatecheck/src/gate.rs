//! One gate run: resolve, materialize, execute, aggregate.
//!
//! Snapshots are owned by [`run_gate`] and dropped only after every worker has
//! been joined, so no check can observe a deleted tree.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::aggregate::{ResultAggregator, RunOutcome};
use crate::core::resolver::requires_old_source;
use crate::core::types::{ChangeSet, CheckInvocation, CheckResult, PlannedCheck};
use crate::differential::NoNew;
use crate::io::check_exec::{CheckRequest, CheckRunner};
use crate::io::config::GateConfig;
use crate::io::interrupt::AbortFlag;
use crate::io::rule_files::load_rule_set;
use crate::io::snapshot::{Snapshots, Snapshotter};

/// Resolve the checks every changed file needs, in invocation order.
pub fn plan_checks(
    root: &Path,
    config: &GateConfig,
    changes: &ChangeSet,
) -> Result<Vec<PlannedCheck>> {
    let rules = load_rule_set(root, &config.rule_file, changes)?;
    Ok(rules.plan(changes))
}

/// Run every check the change set needs and collect the results.
///
/// An empty plan returns immediately without creating any snapshot. An abort
/// observed at any point yields [`RunOutcome::Aborted`], even when it made the
/// snapshot fail; other snapshot failures are fatal and no check runs.
#[instrument(skip_all, fields(files = changes.len(), jobs = config.jobs))]
pub fn run_gate<S, R>(
    root: &Path,
    config: &GateConfig,
    changes: &ChangeSet,
    snapshotter: &S,
    runner: &R,
    abort: &AbortFlag,
) -> Result<RunOutcome>
where
    S: Snapshotter,
    R: CheckRunner + Sync,
{
    let plan = plan_checks(root, config, changes)?;
    if plan.is_empty() {
        info!("no checks apply to the staged changes");
        return Ok(RunOutcome::Completed(ResultAggregator::new()));
    }
    info!(invocations = plan.len(), "checks planned");

    if abort.is_raised() {
        return Ok(RunOutcome::Aborted);
    }
    // SIGINT reaches the git children too, so a failed export may be the abort.
    let snapshots = match Snapshots::materialize(snapshotter, requires_old_source(&plan)) {
        Ok(snapshots) => snapshots,
        Err(err) if abort.is_raised() => {
            debug!(error = %format!("{err:#}"), "snapshot interrupted");
            return Ok(RunOutcome::Aborted);
        }
        Err(err) => return Err(err),
    };
    if abort.is_raised() {
        return Ok(RunOutcome::Aborted);
    }

    let invocations = bind_invocations(&plan, &snapshots)?;
    let results = execute_all(&invocations, config, runner, abort, config.jobs)?;
    drop(snapshots);

    let Some(results) = results else {
        warn!("run aborted, remaining checks skipped");
        return Ok(RunOutcome::Aborted);
    };

    let mut aggregate = ResultAggregator::new();
    for (invocation, result) in invocations.iter().zip(results) {
        aggregate.record(&invocation.file, &invocation.check.declared, result);
    }
    info!(
        passed = aggregate.passed_count(),
        total = aggregate.entries().len(),
        "gate run finished"
    );
    Ok(RunOutcome::Completed(aggregate))
}

/// Attach snapshot paths to each planned check.
pub fn bind_invocations(
    plan: &[PlannedCheck],
    snapshots: &Snapshots,
) -> Result<Vec<CheckInvocation>> {
    plan.iter()
        .map(|planned| {
            Ok(CheckInvocation {
                check: planned.check.clone(),
                file: planned.file.clone(),
                new_path: snapshots.new.full_path(&planned.file)?,
                old_path: snapshots.old_path(&planned.file)?,
            })
        })
        .collect()
}

/// Run invocations on up to `jobs` workers. Results come back in invocation
/// order; `None` means the run was aborted before all of them finished.
fn execute_all<R: CheckRunner + Sync>(
    invocations: &[CheckInvocation],
    config: &GateConfig,
    runner: &R,
    abort: &AbortFlag,
    jobs: usize,
) -> Result<Option<Vec<CheckResult>>> {
    let workers = jobs.clamp(1, invocations.len().max(1));
    let next = AtomicUsize::new(0);

    let batches = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        if abort.is_raised() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(invocation) = invocations.get(index) else {
                            break;
                        };
                        done.push((index, run_invocation(invocation, config, runner)));
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| anyhow!("check worker panicked")))
            .collect::<Result<Vec<_>>>()
    })?;

    if abort.is_raised() {
        return Ok(None);
    }

    let mut slots: Vec<Option<CheckResult>> = vec![None; invocations.len()];
    for (index, result) in batches.into_iter().flatten() {
        slots[index] = Some(result);
    }
    Ok(slots.into_iter().collect())
}

fn run_invocation<R: CheckRunner>(
    invocation: &CheckInvocation,
    config: &GateConfig,
    runner: &R,
) -> CheckResult {
    let resolved = config.resolve_command(&invocation.check);
    let request = CheckRequest {
        command: resolved.command,
        file: invocation.file.clone(),
        new_path: invocation.new_path.clone(),
        old_path: invocation.old_path.clone(),
        env: resolved.env,
    };
    debug!(
        file = %invocation.file,
        check = %invocation.check.declared,
        no_new = invocation.check.no_new,
        "running check"
    );
    let outcome = if invocation.check.no_new {
        NoNew::new(runner).run(&request)
    } else {
        runner.run(&request)
    };
    outcome.unwrap_or_else(|err| {
        warn!(
            file = %invocation.file,
            check = %invocation.check.declared,
            error = %format!("{err:#}"),
            "check could not run"
        );
        CheckResult::errored(format!("{err:#}"))
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use super::*;
    use crate::core::types::Verdict;
    use crate::io::snapshot::SourceTree;

    /// Builds trees from in-memory file lists and counts how often it is used.
    struct MemorySnapshotter {
        staged: Vec<(&'static str, &'static str)>,
        committed: Vec<(&'static str, &'static str)>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MemorySnapshotter {
        fn new(
            staged: Vec<(&'static str, &'static str)>,
            committed: Vec<(&'static str, &'static str)>,
        ) -> Self {
            Self {
                staged,
                committed,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn build(label: &'static str, files: &[(&str, &str)]) -> Result<SourceTree> {
            let mut tree = SourceTree::create(label)?;
            for (rel, body) in files {
                let path = tree.staging_dir().join(rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, body)?;
            }
            tree.mark_available();
            Ok(tree)
        }
    }

    impl Snapshotter for MemorySnapshotter {
        fn snapshot_staged(&self) -> Result<SourceTree> {
            self.calls.lock().expect("lock").push("new");
            Self::build("new", &self.staged)
        }

        fn snapshot_committed(&self) -> Result<SourceTree> {
            self.calls.lock().expect("lock").push("old");
            Self::build("old", &self.committed)
        }
    }

    struct FailingSnapshotter;

    impl Snapshotter for FailingSnapshotter {
        fn snapshot_staged(&self) -> Result<SourceTree> {
            Err(anyhow!("checkout-index failed"))
        }

        fn snapshot_committed(&self) -> Result<SourceTree> {
            Err(anyhow!("read-tree failed"))
        }
    }

    /// Reads the new file and fails when it contains "BAD"; records requests.
    struct ContentRunner {
        seen: Mutex<Vec<CheckRequest>>,
    }

    impl ContentRunner {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CheckRunner for ContentRunner {
        fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
            self.seen.lock().expect("lock").push(request.clone());
            let body = fs::read_to_string(&request.new_path)?;
            let stdout: String = body
                .lines()
                .filter(|line| line.contains("BAD"))
                .map(|line| format!("{line}\n"))
                .collect();
            let code = if stdout.is_empty() { 0 } else { 1 };
            Ok(CheckResult::from_exit(Some(code), stdout, ""))
        }
    }

    fn repo_with_rules(rules: &[(&str, &str)]) -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        for (rel, text) in rules {
            let path = temp.path().join(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, text).expect("write rules");
        }
        temp
    }

    fn completed(outcome: RunOutcome) -> ResultAggregator {
        match outcome {
            RunOutcome::Completed(results) => results,
            RunOutcome::Aborted => panic!("unexpected abort"),
        }
    }

    #[test]
    fn empty_change_set_skips_materialization() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![], vec![]);
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::default(),
            &snaps,
            &ContentRunner::new(),
            &AbortFlag::new(),
        )
        .expect("run");
        assert!(completed(outcome).is_empty());
        assert!(snaps.calls.lock().expect("lock").is_empty());
    }

    #[test]
    fn unmatched_files_skip_materialization() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("README.md", "x")], vec![]);
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["README.md"]),
            &snaps,
            &ContentRunner::new(),
            &AbortFlag::new(),
        )
        .expect("run");
        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert!(snaps.calls.lock().expect("lock").is_empty());
    }

    #[test]
    fn plain_checks_only_materialize_new_tree() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", "ok\n")], vec![("a.py", "ok\n")]);
        let runner = ContentRunner::new();
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py"]),
            &snaps,
            &runner,
            &AbortFlag::new(),
        )
        .expect("run");
        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert_eq!(*snaps.calls.lock().expect("lock"), vec!["new"]);
        let seen = runner.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].old_path.is_none());
    }

    #[test]
    fn cumulative_rules_run_in_order_and_fail_the_run() {
        let repo = repo_with_rules(&[
            ("PRECOMMIT", "*.py: root-lint\n"),
            ("pkg/PRECOMMIT", "*.py: pkg-lint\n"),
        ]);
        let snaps = MemorySnapshotter::new(
            vec![("pkg/a.py", "BAD line\n"), ("b.py", "fine\n")],
            vec![],
        );
        let mut config = GateConfig::default();
        config.jobs = 3;
        let results = completed(
            run_gate(
                repo.path(),
                &config,
                &ChangeSet::new(["pkg/a.py", "b.py"]),
                &snaps,
                &ContentRunner::new(),
                &AbortFlag::new(),
            )
            .expect("run"),
        );
        let order: Vec<(&str, &str)> = results
            .entries()
            .iter()
            .map(|e| (e.file.as_str(), e.check.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("pkg/a.py", "pkg-lint"),
                ("pkg/a.py", "root-lint"),
                ("b.py", "root-lint")
            ]
        );
        assert_eq!(results.verdict(), Verdict::Fail);
        assert_eq!(results.failures().count(), 2);
    }

    #[test]
    fn no_new_check_ignores_existing_violations() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: no-new lint\n")]);
        let snaps = MemorySnapshotter::new(
            vec![("a.py", "BAD old\nBAD new\n"), ("c.py", "BAD fresh\n")],
            vec![("a.py", "BAD old\n")],
        );
        let results = completed(
            run_gate(
                repo.path(),
                &GateConfig::default(),
                &ChangeSet::new(["a.py", "c.py"]),
                &snaps,
                &ContentRunner::new(),
                &AbortFlag::new(),
            )
            .expect("run"),
        );
        assert_eq!(*snaps.calls.lock().expect("lock"), vec!["new", "old"]);
        let outputs: Vec<&str> = results
            .entries()
            .iter()
            .map(|e| e.result.output.as_str())
            .collect();
        assert_eq!(outputs, vec!["BAD new\n", "BAD fresh\n"]);
        assert_eq!(results.entries()[0].check, "no-new lint");
    }

    #[test]
    fn catalog_maps_names_to_commands() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", "ok\n")], vec![]);
        let mut config = GateConfig::default();
        config.checks.insert(
            "lint".to_string(),
            crate::io::config::CheckEntry {
                command: Some("lint-wrapper --strict".to_string()),
                ..Default::default()
            },
        );
        let runner = ContentRunner::new();
        run_gate(
            repo.path(),
            &config,
            &ChangeSet::new(["a.py"]),
            &snaps,
            &runner,
            &AbortFlag::new(),
        )
        .expect("run");
        let seen = runner.seen.lock().expect("lock");
        assert_eq!(seen[0].command, "lint-wrapper --strict");
        assert_eq!(seen[0].file, "a.py");
    }

    #[test]
    fn abort_before_materialization_runs_nothing() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", "BAD\n")], vec![]);
        let abort = AbortFlag::new();
        abort.raise();
        let runner = ContentRunner::new();
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py"]),
            &snaps,
            &runner,
            &abort,
        )
        .expect("run");
        assert_eq!(outcome, RunOutcome::Aborted);
        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert!(snaps.calls.lock().expect("lock").is_empty());
        assert!(runner.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn abort_mid_run_skips_remaining_checks() {
        struct AbortingRunner {
            abort: AbortFlag,
            calls: AtomicUsize,
        }
        impl CheckRunner for AbortingRunner {
            fn run(&self, _request: &CheckRequest) -> Result<CheckResult> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.abort.raise();
                Ok(CheckResult::from_exit(Some(1), "x\n".to_string(), ""))
            }
        }

        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", ""), ("b.py", ""), ("c.py", "")], vec![]);
        let abort = AbortFlag::new();
        let runner = AbortingRunner {
            abort: abort.clone(),
            calls: AtomicUsize::new(0),
        };
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py", "b.py", "c.py"]),
            &snaps,
            &runner,
            &abort,
        )
        .expect("run");
        assert_eq!(outcome, RunOutcome::Aborted);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_failure_is_fatal() {
        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let runner = ContentRunner::new();
        let err = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py"]),
            &FailingSnapshotter,
            &runner,
            &AbortFlag::new(),
        )
        .expect_err("fatal");
        assert!(format!("{err:#}").contains("checkout-index failed"));
        assert!(runner.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn abort_that_breaks_the_snapshot_is_not_fatal() {
        struct InterruptedSnapshotter {
            abort: AbortFlag,
        }
        impl Snapshotter for InterruptedSnapshotter {
            fn snapshot_staged(&self) -> Result<SourceTree> {
                self.abort.raise();
                Err(anyhow!("git checkout-index failed: killed by signal"))
            }

            fn snapshot_committed(&self) -> Result<SourceTree> {
                Err(anyhow!("not reached"))
            }
        }

        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let abort = AbortFlag::new();
        let runner = ContentRunner::new();
        let outcome = run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py"]),
            &InterruptedSnapshotter {
                abort: abort.clone(),
            },
            &runner,
            &abort,
        )
        .expect("interrupted snapshot is an abort");
        assert_eq!(outcome, RunOutcome::Aborted);
        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert!(runner.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn runner_errors_become_failed_results() {
        struct BrokenRunner;
        impl CheckRunner for BrokenRunner {
            fn run(&self, _request: &CheckRequest) -> Result<CheckResult> {
                Err(anyhow!("permission denied"))
            }
        }

        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", ""), ("b.py", "")], vec![]);
        let results = completed(
            run_gate(
                repo.path(),
                &GateConfig::default(),
                &ChangeSet::new(["a.py", "b.py"]),
                &snaps,
                &BrokenRunner,
                &AbortFlag::new(),
            )
            .expect("run"),
        );
        assert_eq!(results.failures().count(), 2);
        assert!(results.entries()[0].result.output.contains("permission denied"));
    }

    #[test]
    fn snapshots_are_removed_after_the_run() {
        struct PathRecorder(Mutex<Vec<std::path::PathBuf>>);
        impl CheckRunner for PathRecorder {
            fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
                assert!(request.new_path.exists());
                self.0.lock().expect("lock").push(request.new_path.clone());
                Ok(CheckResult::from_exit(Some(0), String::new(), ""))
            }
        }

        let repo = repo_with_rules(&[("PRECOMMIT", "*.py: lint\n")]);
        let snaps = MemorySnapshotter::new(vec![("a.py", "x")], vec![]);
        let runner = PathRecorder(Mutex::new(Vec::new()));
        run_gate(
            repo.path(),
            &GateConfig::default(),
            &ChangeSet::new(["a.py"]),
            &snaps,
            &runner,
            &AbortFlag::new(),
        )
        .expect("run");
        let seen = runner.0.lock().expect("lock");
        assert!(!seen[0].exists());
    }
}
