//! Deterministic, pure logic shared by the gate.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod aggregate;
pub mod pattern;
pub mod resolver;
pub mod rules;
pub mod types;
pub mod violations;
