//! Violation sets for differential ("no-new") checking.

use std::collections::HashSet;

/// Distinct violation lines from a check's stdout, in first-seen order.
///
/// Lines are compared by exact text. Blank lines are not violations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationSet {
    lines: Vec<String>,
}

impl ViolationSet {
    pub fn from_output(stdout: &str) -> Self {
        let mut seen = HashSet::new();
        let lines = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter(|line| seen.insert(*line))
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Violations present here but absent from `baseline`.
    pub fn difference(&self, baseline: &ViolationSet) -> ViolationSet {
        let old: HashSet<&str> = baseline.lines.iter().map(String::as_str).collect();
        let lines = self
            .lines
            .iter()
            .filter(|line| !old.contains(line.as_str()))
            .cloned()
            .collect();
        ViolationSet { lines }
    }
}
