//! At most one pipeline run at a time, launched and stopped on request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use stride::agents::AgentKit;
use stride::context::{PipelineContext, RunControl};
use stride::core::types::ModelTier;
use stride::events::{Event, EventKind};
use stride::io::config::StrideConfig;
use stride::io::model::{Model, NoTools};
use stride::io::workspace::WorkspacePaths;
use stride::pipeline::{Pipeline, PipelineConfig};
use tracing::{info, warn};

/// Identity of a launched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    pub run_id: u64,
    pub tier: ModelTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    AlreadyActive(RunInfo),
}

/// Result of a start requested by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Started(RunInfo),
    /// The active run is stopping; the start runs once it finishes.
    Queued { behind: RunInfo, tier: ModelTier },
}

struct ActiveRun {
    info: RunInfo,
    control: RunControl,
    /// Start requested after this run was stopped.
    pending: Option<ModelTier>,
}

struct Inner<M> {
    kit: AgentKit<M, NoTools>,
    ctx: PipelineContext,
    paths: WorkspacePaths,
    cfg: StrideConfig,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
}

pub struct RunManager<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for RunManager<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model + 'static> RunManager<M> {
    pub fn new(
        kit: AgentKit<M, NoTools>,
        ctx: PipelineContext,
        paths: WorkspacePaths,
        cfg: StrideConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                kit,
                ctx,
                paths,
                cfg,
                next_id: AtomicU64::new(1),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn default_tier(&self) -> ModelTier {
        self.inner.cfg.default_tier
    }

    pub fn current(&self) -> Option<RunInfo> {
        self.active().as_ref().map(|run| run.info)
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Launch a run in the background.
    ///
    /// Its summary is published as an `agent` event, a failure as an `error`
    /// event.
    pub fn start(&self, tier: ModelTier) -> Result<RunInfo, StartError> {
        let mut active = self.active();
        if let Some(run) = active.as_ref() {
            return Err(StartError::AlreadyActive(run.info));
        }
        Ok(launch(&self.inner, &mut active, tier))
    }

    /// Like [`RunManager::start`], but a start that arrives while the active
    /// run is stopping is queued behind it. A later start replaces the queued
    /// tier.
    pub fn start_or_queue(&self, tier: ModelTier) -> Result<Launch, StartError> {
        let mut active = self.active();
        if let Some(run) = active.as_mut() {
            if !run.control.is_stopped() {
                return Err(StartError::AlreadyActive(run.info));
            }
            run.pending = Some(tier);
            info!(run_id = run.info.run_id, %tier, "start queued behind stopping run");
            return Ok(Launch::Queued {
                behind: run.info,
                tier,
            });
        }
        Ok(Launch::Started(launch(&self.inner, &mut active, tier)))
    }

    /// Ask the active run to stop. Returns the run that was signalled.
    ///
    /// Also drops any queued start.
    pub fn stop(&self) -> Option<RunInfo> {
        let mut active = self.active();
        let run = active.as_mut()?;
        run.control.stop();
        run.pending = None;
        info!(run_id = run.info.run_id, "stop requested");
        Some(run.info)
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock(&self.inner.active)
    }
}

/// Occupy `slot` with a new run and spawn it. The caller holds the lock.
fn launch<M: Model + 'static>(
    inner: &Arc<Inner<M>>,
    slot: &mut Option<ActiveRun>,
    tier: ModelTier,
) -> RunInfo {
    let info = RunInfo {
        run_id: inner.next_id.fetch_add(1, Ordering::Relaxed),
        tier,
    };
    let control = RunControl::new();
    *slot = Some(ActiveRun {
        info,
        control: control.clone(),
        pending: None,
    });

    info!(run_id = info.run_id, %tier, "launching pipeline run");
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let config = PipelineConfig::from_workspace(&inner.paths, &inner.cfg, tier);
        let result = Pipeline::new(&inner.kit, &inner.ctx, control, config)
            .run()
            .await;
        match result {
            Ok(outcome) => {
                inner.ctx.publish(Event::new(EventKind::Agent {
                    response: outcome.to_string(),
                }));
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(run_id = info.run_id, err = %message, "pipeline run failed");
                inner.ctx.publish(Event::error(message));
            }
        }
        finish(&inner, info.run_id);
    });
    info
}

/// Free the slot held by `run_id`, launching a queued start if there is one.
fn finish<M: Model + 'static>(inner: &Arc<Inner<M>>, run_id: u64) {
    let mut active = lock(&inner.active);
    if !active.as_ref().is_some_and(|run| run.info.run_id == run_id) {
        return;
    }
    if let Some(tier) = active.take().and_then(|run| run.pending) {
        info!(after = run_id, %tier, "launching queued run");
        launch(inner, &mut active, tier);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
