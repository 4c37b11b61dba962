//! Loading rule files for the directories a change set touches.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::resolver::{RuleSet, ancestor_dirs};
use crate::core::rules::RuleFile;
use crate::core::types::ChangeSet;

/// Read and parse every `rule_file_name` on the ancestry of each changed file.
///
/// Each directory is read at most once. A missing rule file contributes
/// nothing; an unreadable or malformed one is an error.
#[instrument(skip_all, fields(rule_file_name = %rule_file_name, files = changes.len()))]
pub fn load_rule_set(root: &Path, rule_file_name: &str, changes: &ChangeSet) -> Result<RuleSet> {
    let mut set = RuleSet::new();
    let mut visited = std::collections::HashSet::new();
    for file in changes.files() {
        for dir in ancestor_dirs(file) {
            if !visited.insert(dir.clone()) {
                continue;
            }
            if let Some(rule_file) = load_rule_file(root, &dir, rule_file_name)? {
                set.insert(rule_file);
            }
        }
    }
    debug!(visited = visited.len(), "rule files loaded");
    Ok(set)
}

/// Load the rule file in `dir` (repository-relative), if present.
pub fn load_rule_file(root: &Path, dir: &str, rule_file_name: &str) -> Result<Option<RuleFile>> {
    let rel = if dir.is_empty() {
        rule_file_name.to_string()
    } else {
        format!("{dir}/{rule_file_name}")
    };
    let path = root.join(&rel);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let rule_file = RuleFile::parse(dir, &rel, &text)?;
    debug!(path = %rel, rules = rule_file.rules.len(), "parsed rule file");
    Ok(Some(rule_file))
}
