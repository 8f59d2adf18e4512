//! Test-only helpers: a scripted model backend and workspace fixtures.

use std::collections::VecDeque;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::activity::Activity;
use crate::core::types::{DeviceStatusRecord, ModelTier, Trigger};
use crate::io::config::StrideConfig;
use crate::io::model::{Message, Model, ModelReply, ModelRequest};
use crate::io::workspace::WorkspacePaths;

/// A request observed by [`ScriptedModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub tier: ModelTier,
    pub messages: Vec<Message>,
}

impl RecordedRequest {
    /// Text of the first (prompt) message.
    pub fn prompt(&self) -> &str {
        self.messages.first().map_or("", |m| m.content.as_str())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(ModelReply),
    Fail(String),
}

/// Model that answers from a queue and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Scripted::Reply).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue plain-text replies.
    pub fn texts<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(replies.into_iter().map(ModelReply::text))
    }

    /// Queue a backend failure.
    pub fn push_error(&self, message: &str) {
        lock(&self.script).push_back(Scripted::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl Model for ScriptedModel {
    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        lock(&self.requests).push(RecordedRequest {
            tier: request.tier,
            messages: request.messages.to_vec(),
        });
        match lock(&self.script).pop_front() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A device record as telemetry ingestion would store it.
pub fn device_record(device_id: &str, raw_status: &str) -> DeviceStatusRecord {
    let activity = Activity::from_tag(raw_status);
    DeviceStatusRecord {
        device_id: device_id.to_string(),
        raw_status: raw_status.to_string(),
        is_active: activity.is_active(),
        trigger: Trigger::None,
        model_tier: activity.tier(),
        timestamp: "2024-01-01T00:00:00+00:00".to_string(),
    }
}

/// Temporary workspace with the default layout and the given plan text.
pub fn workspace_with_plan(plan: &str) -> Result<(TempDir, WorkspacePaths, StrideConfig)> {
    let temp = tempfile::tempdir()?;
    let paths = WorkspacePaths::new(temp.path());
    let cfg = StrideConfig::default();
    let plan_path = paths.plan_path(&cfg);
    if let Some(parent) = plan_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&plan_path, plan)?;
    Ok((temp, paths, cfg))
}
