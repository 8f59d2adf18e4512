//! Shared application state for the pipeline server.

use std::time::Duration;

use stride::context::PipelineContext;
use stride::io::model::Model;

use crate::runs::RunManager;

/// Shared state accessible from all request handlers.
pub struct AppState<M> {
    /// Event bus and device registry shared with pipeline runs.
    pub ctx: PipelineContext,
    pub runs: RunManager<M>,
    /// Idle time after which an SSE client receives a ping.
    pub keepalive: Duration,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            runs: self.runs.clone(),
            keepalive: self.keepalive,
        }
    }
}

impl<M: Model + 'static> AppState<M> {
    pub fn new(ctx: PipelineContext, runs: RunManager<M>, keepalive: Duration) -> Self {
        Self {
            ctx,
            runs,
            keepalive,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state(
    replies: &[&str],
) -> (tempfile::TempDir, AppState<stride::test_support::ScriptedModel>) {
    use stride::agents::AgentKit;
    use stride::io::model::NoTools;
    use stride::io::prompt::PromptBuilder;
    use stride::test_support::{ScriptedModel, device_record, workspace_with_plan};

    let (temp, paths, cfg) = workspace_with_plan("# Plan\n\nShip the exporter.\n").expect("workspace");
    let ctx = PipelineContext::with_capacity(1_000);
    ctx.devices.set_status("watch", device_record("watch", "Run"));
    let kit = AgentKit::new(
        ScriptedModel::texts(replies.iter().copied()),
        NoTools,
        PromptBuilder::new(cfg.prompt_budget_bytes).expect("prompts"),
        cfg.max_agent_iterations,
    );
    let runs = RunManager::new(kit, ctx.clone(), paths, cfg);
    (temp, AppState::new(ctx, runs, Duration::from_secs(30)))
}
