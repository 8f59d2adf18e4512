//! Planner agent: turns plan text into an ordered task list.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::plan::{parse_task_list, tasks_or_fallback};
use crate::core::types::{ModelTier, TaskDescriptor};
use crate::io::model::{Model, ToolResolver};

use super::AgentKit;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerAgent;

impl PlannerAgent {
    /// Decompose `plan`. Unparseable output becomes a single task carrying the
    /// raw response.
    #[instrument(skip_all, fields(tier = %tier, workspace))]
    pub async fn run<M: Model, T: ToolResolver>(
        &self,
        kit: &AgentKit<M, T>,
        plan: &str,
        workspace: &str,
        tier: ModelTier,
    ) -> Result<Vec<TaskDescriptor>> {
        let prompt = kit.prompts.planner(plan, workspace)?;
        let outcome = kit
            .converse(tier, prompt)
            .await
            .context("planner session")?;
        if outcome.capped {
            warn!("planner capped, parsing last reply");
        }
        let tasks = tasks_or_fallback(parse_task_list(&outcome.text));
        info!(tasks = tasks.len(), "plan decomposed");
        Ok(tasks)
    }
}
