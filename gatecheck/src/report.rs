//! Rendering run outcomes for people and for tools.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::aggregate::{AggregateEntry, RunOutcome};
use crate::core::types::Verdict;
use crate::io::config::GateConfig;

const OUTPUT_INDENT: &str = "    ";

/// Output format for `gatecheck run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// Failure report on stderr.
    #[default]
    Human,
    /// Machine-readable report on stdout.
    Json,
}

/// Human-readable report. Empty when every check passed.
pub fn render_human(outcome: &RunOutcome, config: &GateConfig) -> String {
    let results = match outcome {
        RunOutcome::Aborted => {
            return "gatecheck: interrupted, remaining checks skipped\n".to_string();
        }
        RunOutcome::Completed(results) => results,
    };
    let failures: Vec<&AggregateEntry> = results.failures().collect();
    if failures.is_empty() {
        return String::new();
    }

    let total = results.entries().len();
    let mut out = format!(
        "gatecheck: {} of {} check{} failed.\n",
        failures.len(),
        total,
        if total == 1 { "" } else { "s" }
    );
    for entry in failures {
        if entry.result.not_found {
            out.push_str(&format!(
                "[{}] {}: executable not found\n",
                entry.check, entry.file
            ));
            push_indented(&mut out, &entry.result.output);
            out.push_str(&format!("{OUTPUT_INDENT}{}\n", config.install_hint));
            continue;
        }
        out.push_str(&format!("[{}] {}\n", entry.check, entry.file));
        push_indented(&mut out, &entry.result.output);
        if let Some(hint) = config.hint_for(&entry.check) {
            out.push_str(&format!("{OUTPUT_INDENT}hint: {hint}\n"));
        }
    }
    out.push_str("gatecheck: fix the problems above, or commit with --no-verify.\n");
    out
}

fn push_indented(out: &mut String, text: &str) {
    for line in text.trim_end().lines() {
        out.push_str(OUTPUT_INDENT);
        out.push_str(line);
        out.push('\n');
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    verdict: Verdict,
    aborted: bool,
    results: &'a [AggregateEntry],
}

/// JSON report covering every recorded invocation.
pub fn render_json(outcome: &RunOutcome) -> Result<String> {
    let report = match outcome {
        RunOutcome::Aborted => JsonReport {
            verdict: outcome.verdict(),
            aborted: true,
            results: &[],
        },
        RunOutcome::Completed(results) => JsonReport {
            verdict: outcome.verdict(),
            aborted: false,
            results: results.entries(),
        },
    };
    serde_json::to_string_pretty(&report).context("serialize json report")
}
