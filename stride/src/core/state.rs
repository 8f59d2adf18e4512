//! Mutable orchestration state for one pipeline run.
//!
//! The driver owns the only [`PipelineState`] and mutates it between state
//! machine transitions. The cursor only moves through [`PipelineState::advance`],
//! which demands a [`GatePass`] that only the readiness gate hands out.

use std::collections::VecDeque;

use crate::core::types::{ModelTier, TaskDescriptor, TaskStatus};

/// Maximum number of revisions per task (so at most three generation attempts).
pub const MAX_REVISIONS: u32 = 2;

/// Proof that the readiness gate observed a non-empty device registry.
#[derive(Debug)]
pub struct GatePass {
    _private: (),
}

impl GatePass {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    pub task_queue: VecDeque<TaskDescriptor>,
    /// Index of the head of `task_queue` in the original decomposition.
    pub cursor: usize,
    pub revision_count: u32,
    pub needs_revision: bool,
    pub last_review_comment: String,
    pub running: bool,
    pub model_tier: ModelTier,
}

impl PipelineState {
    pub fn new(model_tier: ModelTier) -> Self {
        Self {
            task_queue: VecDeque::new(),
            cursor: 0,
            revision_count: 0,
            needs_revision: false,
            last_review_comment: String::new(),
            running: true,
            model_tier,
        }
    }

    /// Install the decomposed task list. An empty plan stops the run.
    pub fn load_tasks(&mut self, tasks: Vec<TaskDescriptor>) {
        self.running = !tasks.is_empty();
        self.task_queue = tasks.into();
    }

    /// The task currently in flight.
    pub fn current(&self) -> Option<&TaskDescriptor> {
        self.task_queue.front()
    }

    pub fn set_current_status(&mut self, status: TaskStatus) {
        if let Some(task) = self.task_queue.front_mut() {
            task.status = status;
        }
    }

    pub fn has_next(&self) -> bool {
        !self.task_queue.is_empty()
    }

    /// Number of tasks not yet advanced past.
    pub fn remaining(&self) -> usize {
        self.task_queue.len()
    }

    /// Pop the head task and reset per-task revision state.
    pub fn advance(&mut self, _pass: GatePass) -> Option<TaskDescriptor> {
        let finished = self.task_queue.pop_front();
        self.cursor += 1;
        self.revision_count = 0;
        self.needs_revision = false;
        self.last_review_comment.clear();
        finished
    }
}
