//! Stable exit codes for the `stride` CLI.

/// Command succeeded; a run advanced past every task (or there were none).
pub const OK: i32 = 0;
/// Invalid layout, config or plan, or a collaborator failure.
pub const INVALID: i32 = 1;
/// The run was stopped with tasks remaining.
pub const INCOMPLETE: i32 = 2;
/// The readiness gate gave up waiting for device status.
pub const STARVED: i32 = 3;
