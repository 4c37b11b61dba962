//! Stable exit codes for gatecheck CLI commands.

/// All checks passed, nothing needed checking, or the run was aborted.
pub const OK: i32 = 0;
/// At least one check failed; the commit should be rejected.
pub const FAILED: i32 = 1;
/// The gate itself could not run (bad config, malformed rule file, snapshot failure).
pub const ERROR: i32 = 2;
