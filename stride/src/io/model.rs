//! Model backend abstraction.
//!
//! [`Model`] decouples the agents from the concrete language-model backend.
//! [`CommandModel`] spawns a CLI per call; tests use a scripted model that
//! returns predetermined replies without spawning processes.

use std::fmt::Write as _;
use std::future::Future;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ModelTier;
use crate::io::config::{MODEL_PLACEHOLDER, ModelConfig, TierModels};
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(output: &ToolOutput) -> Self {
        let status = if output.is_error { "error" } else { "ok" };
        Self {
            role: Role::Tool,
            content: format!("[{} {status}]\n{}", output.call_id, output.content),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub tier: ModelTier,
    pub messages: &'a [Message],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Abstraction over language-model backends.
pub trait Model: Send + Sync {
    fn respond(&self, request: &ModelRequest<'_>) -> impl Future<Output = Result<ModelReply>> + Send;
}

/// Resolves tool calls requested by a model.
pub trait ToolResolver: Send + Sync {
    fn resolve(&self, call: &ToolCall) -> impl Future<Output = ToolOutput> + Send;
}

/// Resolver for sessions that expose no tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

impl ToolResolver for NoTools {
    async fn resolve(&self, call: &ToolCall) -> ToolOutput {
        warn!(tool = %call.name, "model requested a tool but none are available");
        ToolOutput::error(&call.id, format!("tool '{}' is not available", call.name))
    }
}

/// Model that spawns a command per call, transcript on stdin, reply on stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    tiers: TierModels,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(config: &ModelConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            tiers: config.tiers.clone(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Command line for `tier`, with the model placeholder substituted.
    pub fn argv(&self, tier: ModelTier) -> Vec<String> {
        let model = self.tiers.model_for(tier);
        self.command
            .iter()
            .map(|arg| arg.replace(MODEL_PLACEHOLDER, model))
            .collect()
    }

    fn build_command(&self, tier: ModelTier) -> Result<Command> {
        let argv = self.argv(tier);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("model command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        Ok(cmd)
    }
}

impl Model for CommandModel {
    #[instrument(skip_all, fields(tier = %request.tier, messages = request.messages.len()))]
    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        let cmd = self.build_command(request.tier)?;
        let transcript = render_transcript(request.messages);
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;
        info!(model = self.tiers.model_for(request.tier), "invoking model command");

        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, Some(transcript.as_bytes()), timeout, limit)
        })
        .await
        .context("join model command")?
        .context("run model command")?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "model command timed out");
            return Err(anyhow!("model command timed out after {timeout:?}"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        let mut content = output.stdout_lossy();
        content.push_str(&output.stdout_truncated_notice());
        debug!(bytes = content.len(), "model replied");
        Ok(ModelReply::text(content))
    }
}

/// Flatten a conversation into the text written to the command's stdin.
///
/// A single user turn is passed through verbatim.
pub fn render_transcript(messages: &[Message]) -> String {
    if let [only] = messages
        && only.role == Role::User
    {
        return only.content.clone();
    }
    let mut out = String::new();
    for message in messages {
        let label = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool result",
        };
        let _ = writeln!(out, "## {label}\n\n{}\n", message.content.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &[&str]) -> ModelConfig {
        ModelConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn placeholder_is_replaced_by_tier_model() {
        let model = CommandModel::new(&ModelConfig::default(), ".");
        assert_eq!(model.argv(ModelTier::High), vec!["claude", "-p", "--model", "opus"]);
        assert_eq!(model.argv(ModelTier::Low)[3], "haiku");
    }

    #[test]
    fn single_user_turn_is_verbatim() {
        assert_eq!(render_transcript(&[Message::user("hi")]), "hi");
        let transcript = render_transcript(&[
            Message::user("do it"),
            Message::assistant("calling tool"),
            Message::tool(&ToolOutput::error("c1", "nope")),
        ]);
        assert!(transcript.contains("## User\n\ndo it"));
        assert!(transcript.contains("## Tool result\n\n[c1 error]\nnope"));
    }

    #[tokio::test]
    async fn no_tools_answers_with_error() {
        let call = ToolCall {
            id: "c1".to_string(),
            name: "write_file".to_string(),
            arguments: serde_json::Value::Null,
        };
        let output = NoTools.resolve(&call).await;
        assert!(output.is_error);
        assert_eq!(output.call_id, "c1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_model_returns_stdout() {
        let model = CommandModel::new(&config(&["sh", "-c", "cat; printf ' via {model}'"]), ".");
        let messages = [Message::user("hello")];
        let reply = model
            .respond(&ModelRequest {
                tier: ModelTier::Mid,
                messages: &messages,
            })
            .await
            .expect("reply");
        assert_eq!(reply.content, "hello via sonnet");
        assert!(reply.tool_calls.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let model = CommandModel::new(&config(&["sh", "-c", "echo boom >&2; exit 3"]), ".");
        let messages = [Message::user("hello")];
        let err = model
            .respond(&ModelRequest {
                tier: ModelTier::Low,
                messages: &messages,
            })
            .await
            .expect_err("non-zero exit");
        assert!(err.to_string().contains("boom"));
    }
}
