//! Collection of per-invocation results and the run verdict.

use serde::Serialize;

use super::types::{CheckResult, Verdict};

/// One recorded (file, check) outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateEntry {
    pub file: String,
    pub check: String,
    #[serde(flatten)]
    pub result: CheckResult,
}

/// Results in invocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultAggregator {
    entries: Vec<AggregateEntry>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, file: &str, check: &str, result: CheckResult) {
        self.entries.push(AggregateEntry {
            file: file.to_string(),
            check: check.to_string(),
            result,
        });
    }

    pub fn verdict(&self) -> Verdict {
        if self.entries.iter().any(|e| !e.result.passed) {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    pub fn entries(&self) -> &[AggregateEntry] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &AggregateEntry> {
        self.entries.iter().filter(|e| !e.result.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.passed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a gate run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every planned invocation ran (possibly none).
    Completed(ResultAggregator),
    /// The user cancelled; remaining invocations were skipped.
    Aborted,
}

impl RunOutcome {
    /// Aborted runs count as passing.
    pub fn verdict(&self) -> Verdict {
        match self {
            RunOutcome::Completed(results) => results.verdict(),
            RunOutcome::Aborted => Verdict::Pass,
        }
    }
}
