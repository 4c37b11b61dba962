//! Segment-aware glob matching for rule patterns.
//!
//! `*` and `?` never cross `/`, matching is case-sensitive and leading dots are
//! not special. A pattern declared in a rule file applies to the file's path
//! relative to that rule file's directory and to every trailing suffix of it,
//! so `*.py` at the root selects Python files at any depth.

use anyhow::{Result, anyhow};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled glob pattern from a rule line.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    compiled: Pattern,
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for GlobPattern {}

impl GlobPattern {
    pub fn new(source: &str) -> Result<Self> {
        let compiled =
            Pattern::new(source).map_err(|e| anyhow!("invalid glob '{source}': {}", e.msg))?;
        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match the whole relative path, segment for segment.
    pub fn matches_exact(&self, rel_path: &str) -> bool {
        self.compiled.matches_with(rel_path, MATCH_OPTIONS)
    }

    /// Match `rel_path` or any of its trailing segment suffixes.
    pub fn matches_anywhere(&self, rel_path: &str) -> bool {
        path_suffixes(rel_path).any(|suffix| self.matches_exact(suffix))
    }
}

/// Yield `a/b/c`, `b/c`, `c` for `a/b/c`.
fn path_suffixes(rel_path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(rel_path).chain(
        rel_path
            .char_indices()
            .filter(|&(_, c)| c == '/')
            .map(move |(i, _)| &rel_path[i + 1..])
            .filter(|suffix| !suffix.is_empty()),
    )
}
