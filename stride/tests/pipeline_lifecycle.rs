//! End-to-end pipeline runs against a scripted model.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;

use stride::agents::AgentKit;
use stride::context::{PipelineContext, RunControl};
use stride::core::types::{ModelTier, ReviewResult, Trigger};
use stride::events::{Event, EventKind, ProgressStatus, Subscription};
use stride::gate::PollPolicy;
use stride::io::model::{Model, ModelReply, ModelRequest, NoTools};
use stride::io::prompt::PromptBuilder;
use stride::io::report::report_path;
use stride::pipeline::{Pipeline, PipelineConfig, PipelineOutcome, StopReason};
use stride::telemetry::{TelemetryMessage, ingest};
use stride::test_support::{ScriptedModel, device_record, workspace_with_plan};

const FAIL: &str = r#"{"result": "FAIL", "needs_revision": true, "comment": "add error handling"}"#;
const PASS: &str = r#"{"result": "PASS", "needs_revision": false, "comment": "ok"}"#;

struct Harness {
    _temp: tempfile::TempDir,
    config: PipelineConfig,
    ctx: PipelineContext,
    kit: AgentKit<ScriptedModel, NoTools>,
    events: Subscription,
}

impl Harness {
    fn new(tier: ModelTier, replies: &[&str]) -> Self {
        let (temp, paths, cfg) = workspace_with_plan("# Plan\n\nBuild a CSV exporter.\n").expect("workspace");
        let mut config = PipelineConfig::from_workspace(&paths, &cfg, tier);
        config.gate = PollPolicy::bounded(Duration::from_secs(5), 3);
        let ctx = PipelineContext::with_capacity(1_000);
        let events = ctx.bus.subscribe();
        let kit = AgentKit::new(
            ScriptedModel::texts(replies.iter().copied()),
            NoTools,
            PromptBuilder::new(40_000).expect("prompts"),
            20,
        );
        Self {
            _temp: temp,
            config,
            ctx,
            kit,
            events,
        }
    }

    fn ready(self) -> Self {
        self.ctx.devices.set_status("watch", device_record("watch", "Run"));
        self
    }

    async fn run(&self, control: RunControl) -> PipelineOutcome {
        Pipeline::new(&self.kit, &self.ctx, control, self.config.clone())
            .run()
            .await
            .expect("pipeline run")
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn statuses(events: &[Event]) -> Vec<(usize, ProgressStatus)> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::TaskStatus {
                task_index, status, ..
            } => Some((*task_index, *status)),
            _ => None,
        })
        .collect()
}

/// Requests a stop just before answering call number `stop_at` (1-based).
struct StopOnCall {
    inner: ScriptedModel,
    control: RunControl,
    calls: AtomicUsize,
    stop_at: usize,
}

impl Model for StopOnCall {
    async fn respond(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.stop_at {
            self.control.stop();
        }
        self.inner.respond(request).await
    }
}

fn tasks_json(count: usize) -> String {
    let tasks: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"task": "task {i}", "read_files": [], "write_files": ["src/t{i}.rs"]}}"#))
        .collect();
    format!("[{}]", tasks.join(", "))
}

#[tokio::test]
async fn empty_plan_terminates_without_generating() {
    let mut harness = Harness::new(ModelTier::Mid, &["[]"]).ready();
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.stop, StopReason::NoTasks);
    assert_eq!(outcome.remaining, 0);
    assert_eq!(outcome.generations, 0);
    assert_eq!(harness.kit.model.requests().len(), 1);

    let events = harness.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0].kind, EventKind::TaskList { tasks } if tasks.is_empty()));
}

#[tokio::test]
async fn failing_reviews_cap_at_three_generations() {
    let plan = tasks_json(1);
    let mut harness = Harness::new(
        ModelTier::Mid,
        &[plan.as_str(), "coded", FAIL, "coded again", FAIL, "coded once more", FAIL],
    )
    .ready();
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.stop, StopReason::Complete);
    assert_eq!(outcome.generations, 3);
    assert_eq!(outcome.reviews, 3);
    assert_eq!(outcome.remaining, 0);
    assert_eq!(harness.kit.model.remaining(), 0);

    let events = harness.drain();
    assert_eq!(
        statuses(&events),
        vec![
            (0, ProgressStatus::Coding),
            (0, ProgressStatus::Reviewing),
            (0, ProgressStatus::Revision),
            (0, ProgressStatus::Coding),
            (0, ProgressStatus::Reviewing),
            (0, ProgressStatus::Revision),
            (0, ProgressStatus::Coding),
            (0, ProgressStatus::Reviewing),
            (0, ProgressStatus::Done),
        ]
    );

    let revision_counts: Vec<Option<u32>> = events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::TaskStatus {
                status: ProgressStatus::Coding,
                revision_count,
                ..
            } => Some(*revision_count),
            _ => None,
        })
        .collect();
    assert_eq!(revision_counts, vec![Some(0), Some(1), Some(2)]);

    let flags: Vec<Option<bool>> = events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::TaskStatus {
                status: ProgressStatus::Revision | ProgressStatus::Done,
                needs_revision,
                ..
            } => Some(*needs_revision),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![Some(true), Some(true), Some(false)]);

    // Revision attempts carry the reviewer's comment.
    let prompts: Vec<String> = harness
        .kit
        .model
        .requests()
        .iter()
        .map(|r| r.prompt().to_string())
        .collect();
    assert!(!prompts[1].contains("add error handling"));
    assert!(prompts[3].contains("add error handling"));

    let report = fs::read_to_string(report_path(&harness.config.reports_dir, 0)).expect("report");
    assert!(report.contains("- Result: FAIL"));
    assert!(report.contains("- Needs revision: false"));
    assert!(report.contains("- Revision count: 2"));
}

#[tokio::test]
async fn review_without_verdict_passes() {
    let plan = tasks_json(1);
    let mut harness =
        Harness::new(ModelTier::Low, &[plan.as_str(), "coded", "I could not decide."]).ready();
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.stop, StopReason::Complete);
    assert_eq!(outcome.generations, 1);

    let done = harness
        .drain()
        .into_iter()
        .find_map(|event| match event.kind {
            EventKind::TaskStatus {
                status: ProgressStatus::Done,
                result,
                comment,
                needs_revision,
                ..
            } => Some((result, comment, needs_revision)),
            _ => None,
        })
        .expect("done event");
    assert_eq!(done.0, Some(ReviewResult::Pass));
    assert_eq!(done.1.as_deref(), Some("I could not decide."));
    assert_eq!(done.2, Some(false));
}

#[tokio::test]
async fn every_task_is_advanced_exactly_once() {
    let plan = tasks_json(3);
    let mut replies = vec![plan.as_str()];
    for _ in 0..3 {
        replies.extend(["coded", PASS]);
    }
    let mut harness = Harness::new(ModelTier::High, &replies).ready();
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.stop, StopReason::Complete);
    assert_eq!(outcome.tasks, 3);
    assert_eq!(outcome.advanced, 3);
    assert_eq!(outcome.remaining, 0);

    let events = harness.drain();
    assert!(matches!(&events[0].kind, EventKind::Tasks { tasks } if tasks.len() == 3));
    let done: Vec<usize> = statuses(&events)
        .into_iter()
        .filter(|(_, status)| *status == ProgressStatus::Done)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(done, vec![0, 1, 2]);
    for index in 0..3 {
        assert!(report_path(&harness.config.reports_dir, index).is_file());
    }
}

#[tokio::test]
async fn reviewer_runs_one_tier_below_coder() {
    let plan = tasks_json(1);
    let harness = Harness::new(ModelTier::High, &[plan.as_str(), "coded", PASS]).ready();
    harness.run(RunControl::new()).await;

    let tiers: Vec<ModelTier> = harness.kit.model.requests().iter().map(|r| r.tier).collect();
    assert_eq!(tiers, vec![ModelTier::High, ModelTier::High, ModelTier::Mid]);
}

#[tokio::test(start_paused = true)]
async fn empty_registry_starves_the_gate() {
    let plan = tasks_json(2);
    let mut harness = Harness::new(ModelTier::Mid, &[plan.as_str(), "coded", PASS]);
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.stop, StopReason::GateStarved { attempts: 3 });
    assert_eq!(outcome.advanced, 0);
    assert_eq!(outcome.remaining, 2);

    let waiting = statuses(&harness.drain())
        .into_iter()
        .filter(|(_, status)| *status == ProgressStatus::Waiting)
        .count();
    assert_eq!(waiting, 3);
}

#[tokio::test(start_paused = true)]
async fn telemetry_opens_a_waiting_gate() {
    let plan = tasks_json(1);
    let harness = Harness::new(ModelTier::Mid, &[plan.as_str(), "coded", PASS]);
    let mut config = harness.config.clone();
    config.gate = PollPolicy::unbounded(Duration::from_secs(5));

    let ctx = harness.ctx.clone();
    let reporter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(9)).await;
        ingest(
            &ctx,
            &TelemetryMessage {
                device_id: "watch".to_string(),
                status: "Walk".to_string(),
                bpm: None,
                timestamp: None,
            },
        )
    });

    let outcome = Pipeline::new(&harness.kit, &harness.ctx, RunControl::new(), config)
        .run()
        .await
        .expect("run");
    let record = reporter.await.expect("reporter");

    assert_eq!(outcome.stop, StopReason::Complete);
    assert_eq!(outcome.advanced, 1);
    assert_eq!(record.trigger, Trigger::None);
}

#[tokio::test]
async fn stop_before_first_cycle_leaves_all_tasks() {
    let plan = tasks_json(2);
    let harness = Harness::new(ModelTier::Mid, &[plan.as_str()]).ready();
    let control = RunControl::new();
    control.stop();
    let outcome = harness.run(control).await;

    assert_eq!(outcome.stop, StopReason::Stopped);
    assert_eq!(outcome.remaining, 2);
    assert_eq!(outcome.generations, 0);
}

#[tokio::test]
async fn stop_during_review_counts_reviewed_task_as_processed() {
    let plan = tasks_json(2);
    let harness = Harness::new(ModelTier::Mid, &[]).ready();
    let control = RunControl::new();
    let kit = AgentKit::new(
        StopOnCall {
            inner: ScriptedModel::texts([plan.as_str(), "coded", PASS]),
            control: control.clone(),
            calls: AtomicUsize::new(0),
            stop_at: 3,
        },
        NoTools,
        PromptBuilder::new(40_000).expect("prompts"),
        20,
    );

    let outcome = Pipeline::new(&kit, &harness.ctx, control, harness.config.clone())
        .run()
        .await
        .expect("run");

    assert_eq!(outcome.stop, StopReason::Stopped);
    assert_eq!(outcome.reviews, 1);
    assert_eq!(outcome.advanced, 1);
    assert_eq!(outcome.remaining, 1);
    assert_eq!(kit.model.inner.remaining(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_while_gate_waits_cancels_the_run() {
    let plan = tasks_json(2);
    let harness = Harness::new(ModelTier::Mid, &[plan.as_str(), "coded", PASS]);
    let mut config = harness.config.clone();
    config.gate = PollPolicy::unbounded(Duration::from_secs(5));

    let control = RunControl::new();
    let stopper = control.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        stopper.stop();
    });

    let outcome = Pipeline::new(&harness.kit, &harness.ctx, control, config)
        .run()
        .await
        .expect("run");

    assert_eq!(outcome.stop, StopReason::GateCancelled);
    assert_eq!(outcome.reviews, 1);
    assert_eq!(outcome.advanced, 0);
    assert_eq!(outcome.remaining, 2);
}

#[tokio::test]
async fn prose_plan_becomes_single_task() {
    let mut harness = Harness::new(
        ModelTier::Mid,
        &["Implement the exporter in one go.", "coded", PASS],
    )
    .ready();
    let outcome = harness.run(RunControl::new()).await;

    assert_eq!(outcome.tasks, 1);
    assert_eq!(outcome.stop, StopReason::Complete);
    let events = harness.drain();
    match &events[0].kind {
        EventKind::Tasks { tasks } => {
            assert_eq!(tasks[0].description, "Implement the exporter in one go.");
        }
        other => panic!("unexpected first event {other:?}"),
    }
}

#[tokio::test]
async fn model_failure_aborts_the_run() {
    let plan = tasks_json(1);
    let harness = Harness::new(ModelTier::Mid, &[plan.as_str()]).ready();
    harness.kit.model.push_error("backend unavailable");

    let err = Pipeline::new(&harness.kit, &harness.ctx, RunControl::new(), harness.config.clone())
        .run()
        .await
        .expect_err("coder failure");
    assert!(format!("{err:#}").contains("backend unavailable"));
}

#[test]
fn none_run_none_telemetry_triggers_once_each_way() {
    let ctx = PipelineContext::default();
    let triggers: Vec<Trigger> = ["None", "Run", "Run", "None"]
        .into_iter()
        .map(|status| {
            ingest(
                &ctx,
                &TelemetryMessage {
                    device_id: "m5".to_string(),
                    status: status.to_string(),
                    bpm: Some(100.0),
                    timestamp: None,
                },
            )
            .trigger
        })
        .collect();
    assert_eq!(
        triggers,
        vec![Trigger::None, Trigger::Start, Trigger::None, Trigger::Stop]
    );
}
