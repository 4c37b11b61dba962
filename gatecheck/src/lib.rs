//! Pre-commit gate that dispatches per-file checks declared in rule files.
//!
//! Every directory may carry a rule file mapping glob patterns to check
//! commands. For each staged file the rule files of all its ancestor
//! directories apply cumulatively. Checks run against an exported snapshot of
//! the staged content; checks wrapped in `no-new` also run against the last
//! committed content and only fail on violations the commit introduces.
//!
//! - **[`core`]**: Pure, deterministic logic (rule parsing, resolution,
//!   violation sets, aggregation). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, snapshots, processes, config).
//!
//! [`gate`] ties them together for one run; [`report`] renders the outcome.

pub mod core;
pub mod differential;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
