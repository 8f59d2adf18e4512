//! Bounded conversation with a model.
//!
//! A session is its own small state machine, stepped by a driver loop:
//!
//! ```text
//! Send ──► AwaitToolResolution ──► Send ──► ... ──► Complete
//!   └──────────── iteration cap reached ─────────► CapExceeded
//! ```
//!
//! Reaching the cap is not an error: the session ends with the last assistant
//! text it saw.

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::types::ModelTier;
use crate::io::model::{Message, Model, ModelRequest, ToolCall, ToolResolver};

/// Default number of model calls allowed per session.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Next step calls the model.
    Send,
    /// Next step resolves these tool calls.
    AwaitToolResolution(Vec<ToolCall>),
    Complete(String),
    CapExceeded(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete(_) | SessionState::CapExceeded(_))
    }
}

/// Final result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub text: String,
    pub capped: bool,
    pub iterations: u32,
}

#[derive(Debug, Clone)]
pub struct AgentSession {
    tier: ModelTier,
    messages: Vec<Message>,
    max_iterations: u32,
    iterations: u32,
    last_text: String,
    state: SessionState,
}

impl AgentSession {
    pub fn new(tier: ModelTier, prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            tier,
            messages: vec![Message::user(prompt)],
            max_iterations: max_iterations.max(1),
            iterations: 0,
            last_text: String::new(),
            state: SessionState::Send,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Perform one transition. Terminal states are left unchanged.
    pub async fn step<M: Model, T: ToolResolver>(&mut self, model: &M, tools: &T) -> Result<()> {
        let state = std::mem::replace(&mut self.state, SessionState::Send);
        self.state = match state {
            SessionState::Send => self.send(model).await?,
            SessionState::AwaitToolResolution(calls) => {
                for call in &calls {
                    debug!(tool = %call.name, call_id = %call.id, "resolving tool call");
                    let output = tools.resolve(call).await;
                    self.messages.push(Message::tool(&output));
                }
                SessionState::Send
            }
            terminal => terminal,
        };
        Ok(())
    }

    async fn send<M: Model>(&mut self, model: &M) -> Result<SessionState> {
        if self.iterations >= self.max_iterations {
            return Ok(self.cap_exceeded());
        }
        let reply = model
            .respond(&ModelRequest {
                tier: self.tier,
                messages: &self.messages,
            })
            .await?;
        self.iterations += 1;
        self.messages.push(Message::assistant(reply.content.clone()));
        self.last_text = reply.content;

        if reply.tool_calls.is_empty() {
            return Ok(SessionState::Complete(self.last_text.clone()));
        }
        if self.iterations >= self.max_iterations {
            return Ok(self.cap_exceeded());
        }
        Ok(SessionState::AwaitToolResolution(reply.tool_calls))
    }

    fn cap_exceeded(&self) -> SessionState {
        warn!(
            iterations = self.iterations,
            max_iterations = self.max_iterations,
            "agent session hit iteration cap"
        );
        SessionState::CapExceeded(self.last_text.clone())
    }

    /// Drive the session until it reaches a terminal state.
    pub async fn run<M: Model, T: ToolResolver>(
        mut self,
        model: &M,
        tools: &T,
    ) -> Result<SessionOutcome> {
        while !self.state.is_terminal() {
            self.step(model, tools).await?;
        }
        let iterations = self.iterations;
        Ok(match self.state {
            SessionState::CapExceeded(text) => SessionOutcome {
                text,
                capped: true,
                iterations,
            },
            SessionState::Complete(text) => SessionOutcome {
                text,
                capped: false,
                iterations,
            },
            SessionState::Send | SessionState::AwaitToolResolution(_) => SessionOutcome {
                text: self.last_text,
                capped: false,
                iterations,
            },
        })
    }
}
