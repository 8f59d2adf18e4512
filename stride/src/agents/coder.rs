//! Coder agent: implements one task, optionally addressing review feedback.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{ModelTier, TaskDescriptor};
use crate::io::model::{Model, ToolResolver};
use crate::io::prompt::CoderInputs;

use super::AgentKit;
use super::session::SessionOutcome;

#[derive(Debug, Clone, Copy, Default)]
pub struct CoderAgent;

impl CoderAgent {
    #[instrument(skip_all, fields(tier = %tier, revision_count))]
    pub async fn run<M: Model, T: ToolResolver>(
        &self,
        kit: &AgentKit<M, T>,
        task: &TaskDescriptor,
        revision: Option<&str>,
        revision_count: u32,
        workspace: &str,
        tier: ModelTier,
    ) -> Result<SessionOutcome> {
        let prompt = kit.prompts.coder(&CoderInputs {
            task,
            revision: revision.filter(|_| revision_count > 0),
            revision_count,
            workspace,
        })?;
        let outcome = kit.converse(tier, prompt).await.context("coder session")?;
        info!(iterations = outcome.iterations, capped = outcome.capped, "coder finished");
        Ok(outcome)
    }
}
