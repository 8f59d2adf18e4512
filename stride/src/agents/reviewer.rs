//! Reviewer agent: judges one task's implementation.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{ModelTier, ReviewVerdict, TaskDescriptor};
use crate::core::verdict::{parse_verdict, verdict_or_pass};
use crate::io::model::{Model, ToolResolver};
use crate::io::prompt::ReviewerInputs;

use super::AgentKit;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewerAgent;

impl ReviewerAgent {
    /// Review at `tier`. A reply without a parseable verdict passes.
    #[instrument(skip_all, fields(tier = %tier))]
    pub async fn run<M: Model, T: ToolResolver>(
        &self,
        kit: &AgentKit<M, T>,
        task: &TaskDescriptor,
        changed_files: &[String],
        workspace: &str,
        tier: ModelTier,
    ) -> Result<ReviewVerdict> {
        let prompt = kit.prompts.reviewer(&ReviewerInputs {
            task,
            changed_files,
            workspace,
        })?;
        let outcome = kit
            .converse(tier, prompt)
            .await
            .context("reviewer session")?;
        let verdict = verdict_or_pass(parse_verdict(&outcome.text));
        info!(
            result = verdict.result.as_str(),
            needs_revision = verdict.needs_revision,
            "review finished"
        );
        Ok(verdict)
    }
}
