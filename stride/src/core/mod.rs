//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod activity;
pub mod extract;
pub mod plan;
pub mod revision;
pub mod state;
pub mod types;
pub mod verdict;
