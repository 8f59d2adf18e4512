//! Planner, coder and reviewer agents.
//!
//! Each agent renders its prompt, runs one bounded [`session::AgentSession`]
//! and turns the final text into a typed result.

use anyhow::Result;

use crate::core::types::ModelTier;
use crate::io::model::{Model, ToolResolver};
use crate::io::prompt::PromptBuilder;

pub mod coder;
pub mod planner;
pub mod reviewer;
pub mod session;

use session::{AgentSession, SessionOutcome};

/// Everything an agent needs to talk to the model.
pub struct AgentKit<M, T> {
    pub model: M,
    pub tools: T,
    pub prompts: PromptBuilder,
    pub max_iterations: u32,
}

impl<M: Model, T: ToolResolver> AgentKit<M, T> {
    pub fn new(model: M, tools: T, prompts: PromptBuilder, max_iterations: u32) -> Self {
        Self {
            model,
            tools,
            prompts,
            max_iterations,
        }
    }

    pub(crate) async fn converse(&self, tier: ModelTier, prompt: String) -> Result<SessionOutcome> {
        AgentSession::new(tier, prompt, self.max_iterations)
            .run(&self.model, &self.tools)
            .await
    }
}
