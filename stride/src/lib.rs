//! Activity-gated development pipeline.
//!
//! A plan is decomposed into tasks, and each task cycles through generation,
//! review and bounded revision. Advancing to the next task waits for device
//! status telemetry, and every transition is published to live observers.
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, revision control, task
//!   queue, activity mapping). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, files, git, processes,
//!   prompts, the model backend).
//! - **[`agents`]**: Planner, coder and reviewer sessions.
//!
//! Orchestration modules ([`events`], [`devices`], [`gate`], [`telemetry`],
//! [`pipeline`]) compose core logic with I/O.

pub mod agents;
pub mod context;
pub mod core;
pub mod devices;
pub mod events;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
