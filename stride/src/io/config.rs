//! Pipeline configuration stored under `.stride/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::ModelTier;
use crate::events::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::gate::PollPolicy;

/// Placeholder in `model.command` replaced by the tier's model id.
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// Pipeline configuration (TOML).
///
/// Edited by humans. Missing fields fall back to defaults; relative paths
/// resolve against the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StrideConfig {
    /// Plan text read by the planner.
    pub plan_path: PathBuf,

    /// Directory receiving `review_NN.md` reports.
    pub reports_dir: PathBuf,

    /// Tier used when a run is started without one.
    pub default_tier: ModelTier,

    /// Model calls allowed per agent session before it is capped.
    pub max_agent_iterations: u32,

    /// Upper bound on rendered prompt size.
    pub prompt_budget_bytes: usize,

    pub gate: GateConfig,
    pub events: EventsConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub poll_interval_secs: u64,
    /// Give up after this many empty polls. Unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_polls: None,
        }
    }
}

impl GateConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_polls,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    pub subscriber_capacity: usize,
    /// Idle seconds before an observer stream sends a keepalive ping.
    pub keepalive_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            keepalive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Command spawned per model call. The transcript is written to stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    pub tiers: TierModels,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--model".to_string(),
                MODEL_PLACEHOLDER.to_string(),
            ],
            timeout_secs: 600,
            output_limit_bytes: 200_000,
            tiers: TierModels::default(),
        }
    }
}

/// Model id per capability tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TierModels {
    pub low: String,
    pub mid: String,
    pub high: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            low: "haiku".to_string(),
            mid: "sonnet".to_string(),
            high: "opus".to_string(),
        }
    }
}

impl TierModels {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Low => &self.low,
            ModelTier::Mid => &self.mid,
            ModelTier::High => &self.high,
        }
    }
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            plan_path: PathBuf::from("docs/plan.md"),
            reports_dir: PathBuf::from("docs"),
            default_tier: ModelTier::Mid,
            max_agent_iterations: 20,
            prompt_budget_bytes: 40_000,
            gate: GateConfig::default(),
            events: EventsConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl StrideConfig {
    pub fn validate(&self) -> Result<()> {
        if self.plan_path.as_os_str().is_empty() {
            return Err(anyhow!("plan_path must not be empty"));
        }
        if self.max_agent_iterations == 0 {
            return Err(anyhow!("max_agent_iterations must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.gate.poll_interval_secs == 0 {
            return Err(anyhow!("gate.poll_interval_secs must be > 0"));
        }
        if self.gate.max_polls == Some(0) {
            return Err(anyhow!("gate.max_polls must be > 0 when set"));
        }
        if self.events.subscriber_capacity == 0 {
            return Err(anyhow!("events.subscriber_capacity must be > 0"));
        }
        if self.events.keepalive_secs == 0 {
            return Err(anyhow!("events.keepalive_secs must be > 0"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        for tier in [ModelTier::Low, ModelTier::Mid, ModelTier::High] {
            if self.model.tiers.model_for(tier).trim().is_empty() {
                return Err(anyhow!("model.tiers.{tier} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StrideConfig::default()`.
pub fn load_config(path: &Path) -> Result<StrideConfig> {
    if !path.exists() {
        let cfg = StrideConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StrideConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StrideConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, StrideConfig::default());
        assert_eq!(cfg.gate.policy(), PollPolicy::default());
    }

    #[test]
    fn write_then_load_preserves_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".stride/config.toml");
        let mut cfg = StrideConfig::default();
        cfg.default_tier = ModelTier::High;
        cfg.gate.max_polls = Some(12);
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "default_tier = \"opus\"\n[model.tiers]\nhigh = \"opus-large\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.default_tier, ModelTier::High);
        assert_eq!(cfg.model.tiers.model_for(ModelTier::High), "opus-large");
        assert_eq!(cfg.model.tiers.model_for(ModelTier::Low), "haiku");
        assert_eq!(cfg.events.subscriber_capacity, 100);
    }

    #[test]
    fn zero_poll_bound_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[gate]\nmax_polls = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_polls"));
    }
}
