//! Shared deterministic types for the pipeline core.
//!
//! These types define stable contracts between core components and the wire
//! formats observers see. They must not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single task in the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Coding,
    Reviewing,
    Done,
    Revision,
}

/// One unit of generate/review work produced by decomposition.
///
/// Only `status` changes after decomposition. Path lists are always present
/// (possibly empty) so downstream logic never special-cases missing hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(rename = "task")]
    pub description: String,
    #[serde(rename = "read_files", default)]
    pub read_paths: Vec<String>,
    #[serde(rename = "write_files", default)]
    pub write_paths: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskDescriptor {
    pub fn new(
        description: impl Into<String>,
        read_paths: Vec<String>,
        write_paths: Vec<String>,
    ) -> Self {
        Self {
            description: description.into(),
            read_paths,
            write_paths,
            status: TaskStatus::Pending,
        }
    }

    /// A task with no file hints (legacy planner output).
    pub fn bare(description: impl Into<String>) -> Self {
        Self::new(description, Vec::new(), Vec::new())
    }
}

/// Capability tier used to select the model for a call.
///
/// Ordered from cheapest to most capable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    #[serde(alias = "haiku")]
    Low,
    #[serde(alias = "sonnet")]
    Mid,
    #[serde(alias = "opus")]
    High,
}

impl ModelTier {
    /// One step cheaper, saturating at [`ModelTier::Low`].
    pub fn lower(self) -> Self {
        match self {
            ModelTier::High => ModelTier::Mid,
            ModelTier::Mid | ModelTier::Low => ModelTier::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Low => "low",
            ModelTier::Mid => "mid",
            ModelTier::High => "high",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = anyhow::Error;

    /// Accepts `low|mid|high` and the model-family aliases `haiku|sonnet|opus`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "haiku" => Ok(ModelTier::Low),
            "mid" | "sonnet" => Ok(ModelTier::Mid),
            "high" | "opus" => Ok(ModelTier::High),
            other => Err(anyhow!(
                "unknown model tier '{other}' (expected low, mid or high)"
            )),
        }
    }
}

/// Pass/fail outcome declared by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewResult {
    Pass,
    Fail,
}

impl ReviewResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewResult::Pass => "PASS",
            ReviewResult::Fail => "FAIL",
        }
    }
}

/// Verdict produced once per review attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub result: ReviewResult,
    pub needs_revision: bool,
    pub comment: String,
}

impl ReviewVerdict {
    /// Verdict used when the reviewer produced no parseable verdict block.
    pub fn fail_open(raw: impl Into<String>) -> Self {
        Self {
            result: ReviewResult::Pass,
            needs_revision: false,
            comment: raw.into(),
        }
    }

    /// Whether this verdict asks for another generation attempt.
    ///
    /// A FAIL always counts as a revision request.
    pub fn requests_revision(&self) -> bool {
        self.needs_revision || self.result == ReviewResult::Fail
    }
}

/// Edge detected between two consecutive status reports of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Start,
    Stop,
    #[default]
    None,
}

/// Last-known status of a device, keyed by `device_id` in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    pub device_id: String,
    pub raw_status: String,
    pub is_active: bool,
    pub trigger: Trigger,
    pub model_tier: ModelTier,
    pub timestamp: String,
}
