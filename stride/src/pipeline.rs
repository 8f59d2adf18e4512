//! Task orchestration state machine.
//!
//! ```text
//! Planning ──► Generating ──► Reviewing ──┬──► Revising ──► Generating
//!                  ▲                      └──► Advancing ──┬──► Generating
//!                  └───────────────────────────────────────┘    └──► Terminated
//! ```
//!
//! Exactly one task is in flight. A task that starts generating always reaches
//! review. A reviewed task is advanced past before the stop flag is sampled,
//! and advancing always passes the readiness gate first.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agents::AgentKit;
use crate::agents::coder::CoderAgent;
use crate::agents::planner::PlannerAgent;
use crate::agents::reviewer::ReviewerAgent;
use crate::context::{PipelineContext, RunControl};
use crate::core::revision::{RevisionDecision, begin_revision, record_verdict, should_revise};
use crate::core::state::PipelineState;
use crate::core::types::{ModelTier, ReviewVerdict, TaskStatus};
use crate::events::{Event, EventKind, ProgressStatus};
use crate::gate::{GateError, PollPolicy, ReadinessGate};
use crate::io::config::StrideConfig;
use crate::io::git::Git;
use crate::io::model::{Model, ToolResolver};
use crate::io::report::write_report;
use crate::io::workspace::{WorkspacePaths, read_plan};

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tier: ModelTier,
    pub plan_path: PathBuf,
    pub reports_dir: PathBuf,
    /// Workspace root; used for git status and as the planner's workspace id.
    pub root: PathBuf,
    pub workspace_id: String,
    pub gate: PollPolicy,
}

impl PipelineConfig {
    pub fn from_workspace(paths: &WorkspacePaths, cfg: &StrideConfig, tier: ModelTier) -> Self {
        Self {
            tier,
            plan_path: paths.plan_path(cfg),
            reports_dir: paths.reports_dir(cfg),
            root: paths.root.clone(),
            workspace_id: paths.workspace_id(),
            gate: cfg.gate.policy(),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every task was advanced past.
    Complete,
    /// Decomposition produced no tasks.
    NoTasks,
    /// A stop was requested between task cycles.
    Stopped,
    /// The gate gave up waiting for device status.
    GateStarved { attempts: u32 },
    /// A stop was requested while waiting at the gate.
    GateCancelled,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Complete => "complete",
            StopReason::NoTasks => "no_tasks",
            StopReason::Stopped => "stopped",
            StopReason::GateStarved { .. } => "gate_starved",
            StopReason::GateCancelled => "gate_cancelled",
        }
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub tier: ModelTier,
    pub tasks: usize,
    /// Tasks not advanced past when the run ended.
    pub remaining: usize,
    pub advanced: usize,
    pub generations: u32,
    pub reviews: u32,
    pub stop: StopReason,
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline {} ({} remaining of {} tasks, tier {})",
            self.stop.as_str(),
            self.remaining,
            self.tasks,
            self.tier
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Generating,
    Reviewing,
    Revising,
    Advancing,
    Terminated(StopReason),
}

#[derive(Debug, Default)]
struct Counters {
    tasks: usize,
    advanced: usize,
    generations: u32,
    reviews: u32,
}

/// Drives one run from plan to termination.
pub struct Pipeline<'a, M, T> {
    kit: &'a AgentKit<M, T>,
    ctx: &'a PipelineContext,
    control: RunControl,
    config: PipelineConfig,
}

impl<'a, M: Model, T: ToolResolver> Pipeline<'a, M, T> {
    pub fn new(
        kit: &'a AgentKit<M, T>,
        ctx: &'a PipelineContext,
        control: RunControl,
        config: PipelineConfig,
    ) -> Self {
        Self {
            kit,
            ctx,
            control,
            config,
        }
    }

    /// Run to termination. Collaborator and file errors abort the run.
    #[instrument(skip_all, fields(tier = %self.config.tier))]
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let mut state = PipelineState::new(self.config.tier);
        let mut counters = Counters::default();
        let gate = ReadinessGate::new(self.config.gate);
        let mut phase = Phase::Planning;

        loop {
            debug!(?phase, cursor = state.cursor, "pipeline transition");
            phase = match phase {
                Phase::Planning => self.plan(&mut state, &mut counters).await?,
                Phase::Generating => self.generate(&mut state, &mut counters).await?,
                Phase::Reviewing => self.review(&mut state, &mut counters).await?,
                Phase::Revising => {
                    begin_revision(&mut state);
                    state.set_current_status(TaskStatus::Revision);
                    info!(
                        task_index = state.cursor,
                        revision_count = state.revision_count,
                        "revising task"
                    );
                    Phase::Generating
                }
                Phase::Advancing => self.advance(&mut state, &mut counters, &gate).await,
                Phase::Terminated(stop) => {
                    let outcome = PipelineOutcome {
                        tier: self.config.tier,
                        tasks: counters.tasks,
                        remaining: state.remaining(),
                        advanced: counters.advanced,
                        generations: counters.generations,
                        reviews: counters.reviews,
                        stop,
                    };
                    info!(%outcome, "pipeline terminated");
                    return Ok(outcome);
                }
            };
        }
    }

    async fn plan(&self, state: &mut PipelineState, counters: &mut Counters) -> Result<Phase> {
        let plan = read_plan(&self.config.plan_path)?;
        let tasks = PlannerAgent
            .run(self.kit, &plan, &self.config.workspace_id, state.model_tier)
            .await?;
        counters.tasks = tasks.len();

        let kind = if tasks.is_empty() {
            EventKind::TaskList {
                tasks: tasks.clone(),
            }
        } else {
            EventKind::Tasks {
                tasks: tasks.clone(),
            }
        };
        state.load_tasks(tasks);
        self.ctx.publish(Event::new(kind));

        if !state.running {
            return Ok(Phase::Terminated(StopReason::NoTasks));
        }
        Ok(self.next_cycle(state))
    }

    async fn generate(&self, state: &mut PipelineState, counters: &mut Counters) -> Result<Phase> {
        let Some(task) = state.current().cloned() else {
            return Ok(Phase::Terminated(StopReason::Complete));
        };
        state.set_current_status(TaskStatus::Coding);
        self.publish_status(state.cursor, ProgressStatus::Coding, None, Some(state.revision_count));

        let revision = (state.revision_count > 0).then_some(state.last_review_comment.as_str());
        CoderAgent
            .run(
                self.kit,
                &task,
                revision,
                state.revision_count,
                &self.config.workspace_id,
                state.model_tier,
            )
            .await?;
        counters.generations += 1;
        Ok(Phase::Reviewing)
    }

    async fn review(&self, state: &mut PipelineState, counters: &mut Counters) -> Result<Phase> {
        let Some(task) = state.current().cloned() else {
            return Ok(Phase::Terminated(StopReason::Complete));
        };
        state.set_current_status(TaskStatus::Reviewing);
        self.publish_status(state.cursor, ProgressStatus::Reviewing, None, None);

        let changed = self.changed_files();
        let verdict = ReviewerAgent
            .run(
                self.kit,
                &task,
                &changed,
                &self.config.workspace_id,
                state.model_tier.lower(),
            )
            .await?;
        counters.reviews += 1;

        record_verdict(state, &verdict);
        // Reports and events carry the flag after the revision cap is applied.
        let verdict = ReviewVerdict {
            needs_revision: state.needs_revision,
            ..verdict
        };
        write_report(
            &self.config.reports_dir,
            state.cursor,
            &task,
            &verdict,
            state.revision_count,
        )
        .context("write review report")?;

        let decision = should_revise(state);
        let status = match decision {
            RevisionDecision::LoopToGenerate => ProgressStatus::Revision,
            RevisionDecision::Advance => ProgressStatus::Done,
        };
        self.publish_status(state.cursor, status, Some(&verdict), Some(state.revision_count));

        Ok(match decision {
            RevisionDecision::LoopToGenerate => Phase::Revising,
            RevisionDecision::Advance => {
                state.set_current_status(TaskStatus::Done);
                Phase::Advancing
            }
        })
    }

    async fn advance(
        &self,
        state: &mut PipelineState,
        counters: &mut Counters,
        gate: &ReadinessGate,
    ) -> Phase {
        let pass = match gate.wait(self.ctx, &self.control, state.cursor).await {
            Ok(pass) => pass,
            Err(GateError::Starved { attempts }) => {
                warn!(attempts, "gate starved, terminating run");
                return Phase::Terminated(StopReason::GateStarved { attempts });
            }
            Err(GateError::Cancelled) => {
                state.running = false;
                return Phase::Terminated(StopReason::GateCancelled);
            }
        };
        if let Some(finished) = state.advance(pass) {
            counters.advanced += 1;
            info!(task = %finished.description, next_index = state.cursor, "task advanced");
        }
        self.next_cycle(state)
    }

    /// Decide whether another task cycle starts.
    fn next_cycle(&self, state: &mut PipelineState) -> Phase {
        if !state.has_next() {
            return Phase::Terminated(StopReason::Complete);
        }
        if self.control.is_stopped() {
            state.running = false;
        }
        if !state.running {
            return Phase::Terminated(StopReason::Stopped);
        }
        Phase::Generating
    }

    fn publish_status(
        &self,
        task_index: usize,
        status: ProgressStatus,
        verdict: Option<&ReviewVerdict>,
        revision_count: Option<u32>,
    ) {
        self.ctx.publish(Event::new(EventKind::TaskStatus {
            task_index,
            status,
            result: verdict.map(|v| v.result),
            comment: verdict.map(|v| v.comment.clone()),
            needs_revision: verdict.map(|v| v.needs_revision),
            revision_count,
        }));
    }

    fn changed_files(&self) -> Vec<String> {
        match Git::new(&self.config.root).status_porcelain() {
            Ok(entries) => entries.into_iter().map(|e| e.path).collect(),
            Err(err) => {
                debug!(err = %err, "git status unavailable, reviewing without changed files");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_summary_names_reason_and_tier() {
        let outcome = PipelineOutcome {
            tier: ModelTier::High,
            tasks: 3,
            remaining: 1,
            advanced: 2,
            generations: 4,
            reviews: 4,
            stop: StopReason::GateStarved { attempts: 2 },
        };
        assert_eq!(
            outcome.to_string(),
            "pipeline gate_starved (1 remaining of 3 tasks, tier high)"
        );
    }
}
