//! Readiness gate between task cycles.
//!
//! Advancing to the next task requires at least one device status record. The
//! gate polls the registry, announcing `waiting` on every empty poll, and only
//! hands out a [`GatePass`] once a record exists.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::context::{PipelineContext, RunControl};
use crate::core::state::GatePass;
use crate::events::{Event, ProgressStatus};

/// Default delay between registry polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The registry stayed empty for every allowed poll.
    Starved { attempts: u32 },
    /// The run was stopped while waiting.
    Cancelled,
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::Starved { attempts } => {
                write!(f, "no device status after {attempts} polls")
            }
            GateError::Cancelled => f.write_str("run stopped while waiting for device status"),
        }
    }
}

impl std::error::Error for GateError {}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    policy: PollPolicy,
}

impl ReadinessGate {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Wait until the device registry is non-empty.
    ///
    /// Publishes `task_status: waiting` for `task_index` on every empty poll.
    /// A stop only cancels a wait that would otherwise sleep.
    pub async fn wait(
        &self,
        ctx: &PipelineContext,
        control: &RunControl,
        task_index: usize,
    ) -> Result<GatePass, GateError> {
        let mut attempts = 0u32;
        loop {
            if !ctx.devices.all_statuses().is_empty() {
                debug!(task_index, attempts, "gate open");
                return Ok(GatePass::new());
            }
            if control.is_stopped() {
                info!(task_index, attempts, "gate cancelled");
                return Err(GateError::Cancelled);
            }

            attempts += 1;
            ctx.publish(Event::task_status(task_index, ProgressStatus::Waiting));
            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                info!(task_index, attempts, "gate starved");
                return Err(GateError::Starved { attempts });
            }
            debug!(task_index, attempts, "no device status yet, sleeping");
            tokio::time::sleep(self.policy.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DeviceStatusRecord, ModelTier, Trigger};
    use crate::events::EventKind;

    fn record() -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id: "watch".to_string(),
            raw_status: "Run".to_string(),
            is_active: true,
            trigger: Trigger::Start,
            model_tier: ModelTier::High,
            timestamp: "t".to_string(),
        }
    }

    fn waiting_count(sub: &mut crate::events::Subscription) -> usize {
        let mut count = 0;
        while let Some(event) = sub.try_recv() {
            if matches!(
                event.kind,
                EventKind::TaskStatus {
                    status: ProgressStatus::Waiting,
                    ..
                }
            ) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn open_registry_passes_without_waiting() {
        let ctx = PipelineContext::default();
        ctx.devices.set_status("watch", record());
        let mut sub = ctx.bus.subscribe();

        let gate = ReadinessGate::new(PollPolicy::default());
        assert!(gate.wait(&ctx, &RunControl::new(), 0).await.is_ok());
        assert_eq!(waiting_count(&mut sub), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_policy_starves_after_max_attempts() {
        let ctx = PipelineContext::default();
        let mut sub = ctx.bus.subscribe();

        let gate = ReadinessGate::new(PollPolicy::bounded(Duration::from_secs(5), 3));
        let err = gate
            .wait(&ctx, &RunControl::new(), 1)
            .await
            .expect_err("empty registry");

        assert_eq!(err, GateError::Starved { attempts: 3 });
        assert_eq!(waiting_count(&mut sub), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_opens_once_a_device_reports() {
        let ctx = PipelineContext::default();
        let mut sub = ctx.bus.subscribe();
        let gate = ReadinessGate::new(PollPolicy::unbounded(Duration::from_secs(5)));

        let devices = ctx.devices.clone();
        let reporter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            devices.set_status("watch", record());
        });

        gate.wait(&ctx, &RunControl::new(), 0)
            .await
            .expect("gate opens");
        reporter.await.expect("reporter");

        // Polls at t=0, 5, 10 were empty; t=15 sees the record.
        assert_eq!(waiting_count(&mut sub), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_wait() {
        let ctx = PipelineContext::default();
        let control = RunControl::new();
        let gate = ReadinessGate::new(PollPolicy::default());

        let stopper = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            stopper.stop();
        });

        let err = gate.wait(&ctx, &control, 0).await.expect_err("cancelled");
        assert_eq!(err, GateError::Cancelled);
        assert!(ctx.devices.is_empty());
    }

    #[tokio::test]
    async fn stop_does_not_block_an_open_gate() {
        let ctx = PipelineContext::default();
        ctx.devices.set_status("watch", record());
        let control = RunControl::new();
        control.stop();

        let gate = ReadinessGate::new(PollPolicy::default());
        assert!(gate.wait(&ctx, &control, 0).await.is_ok());
    }
}
