//! Rule file parsing.
//!
//! A rule file holds one rule per line: `<glob>[ <glob>...]:<check-command>`.
//! Blank lines and lines starting with `#` are ignored. Any other line that
//! does not parse is an error naming the file and line.

use anyhow::{Result, anyhow};

use super::pattern::GlobPattern;
use super::types::CheckSpec;

/// One rule: the patterns that select files and the check they route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub patterns: Vec<GlobPattern>,
    pub check: CheckSpec,
    /// 1-based line number in the rule file.
    pub line: usize,
}

impl Rule {
    /// True if any pattern matches; evaluation stops at the first hit.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches_anywhere(rel_path))
    }
}

/// The rules declared in a single directory, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFile {
    /// Repository-relative directory holding the file; empty for the root.
    pub dir: String,
    pub rules: Vec<Rule>,
}

impl RuleFile {
    /// Parse rule file text. `origin` is used only in error messages.
    pub fn parse(dir: &str, origin: &str, text: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let parsed = parse_line(raw).map_err(|e| anyhow!("{origin}:{line}: {e}"))?;
            if let Some((patterns, check)) = parsed {
                rules.push(Rule {
                    patterns,
                    check,
                    line,
                });
            }
        }
        Ok(Self {
            dir: dir.to_string(),
            rules,
        })
    }
}

fn parse_line(raw: &str) -> Result<Option<(Vec<GlobPattern>, CheckSpec)>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let (globs, command) = trimmed
        .split_once(':')
        .ok_or_else(|| anyhow!("expected '<glob>[ <glob>...]:<check>', got '{trimmed}'"))?;

    let patterns = globs
        .split_whitespace()
        .map(GlobPattern::new)
        .collect::<Result<Vec<_>>>()?;
    if patterns.is_empty() {
        return Err(anyhow!("rule has no glob patterns"));
    }

    let command = command.trim();
    if command.is_empty() {
        return Err(anyhow!("rule has no check command"));
    }

    Ok(Some((patterns, CheckSpec::parse(command))))
}
