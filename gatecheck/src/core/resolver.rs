//! Ancestry-based rule resolution.
//!
//! Every rule file between a changed file's directory and the repository root
//! contributes; nearer directories are consulted first. Resolution is
//! cumulative, so one file may pick up the same check from several levels.

use std::collections::BTreeMap;

use super::rules::RuleFile;
use super::types::{ChangeSet, CheckSpec, PlannedCheck};

/// Directories from `file`'s parent up to the root (`""`), nearest first.
///
/// `pkg/sub/foo.py` yields `["pkg/sub", "pkg", ""]`; `foo.py` yields `[""]`.
pub fn ancestor_dirs(file: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut current = file;
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        dirs.push(current.to_string());
    }
    dirs.push(String::new());
    dirs
}

/// Path of `file` relative to `dir` (a repository-relative ancestor).
pub fn relative_to<'a>(dir: &str, file: &'a str) -> &'a str {
    if dir.is_empty() {
        return file;
    }
    file.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(file)
}

/// Rule files loaded for a run, keyed by repository-relative directory.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    files: BTreeMap<String, RuleFile>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: RuleFile) {
        self.files.insert(file.dir.clone(), file);
    }

    pub fn contains_dir(&self, dir: &str) -> bool {
        self.files.contains_key(dir)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Checks that apply to `file`, in ancestor order then declaration order.
    pub fn resolve(&self, file: &str) -> Vec<&CheckSpec> {
        let mut checks = Vec::new();
        for dir in ancestor_dirs(file) {
            let Some(rule_file) = self.files.get(&dir) else {
                continue;
            };
            let rel = relative_to(&dir, file);
            for rule in &rule_file.rules {
                if rule.matches(rel) {
                    checks.push(&rule.check);
                }
            }
        }
        checks
    }

    /// Expand a change set into (file, check) pairs in file order.
    pub fn plan(&self, changes: &ChangeSet) -> Vec<PlannedCheck> {
        changes
            .files()
            .iter()
            .flat_map(|file| {
                self.resolve(file).into_iter().map(|check| PlannedCheck {
                    file: file.clone(),
                    check: check.clone(),
                })
            })
            .collect()
    }
}

/// True when any planned check needs the last committed snapshot.
pub fn requires_old_source(plan: &[PlannedCheck]) -> bool {
    plan.iter().any(|p| p.check.no_new)
}
