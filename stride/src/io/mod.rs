//! Side-effecting adapters: files, subprocesses, prompts and the model backend.

pub mod config;
pub mod git;
pub mod model;
pub mod process;
pub mod prompt;
pub mod report;
pub mod workspace;
