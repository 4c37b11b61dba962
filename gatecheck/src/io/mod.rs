//! I/O adapters for the gate.

pub mod check_exec;
pub mod config;
pub mod git;
pub mod init;
pub mod interrupt;
pub mod process;
pub mod rule_files;
pub mod snapshot;
