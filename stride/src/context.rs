//! Shared handles a pipeline run is wired with.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::devices::DeviceRegistry;
use crate::events::{Event, EventBus};

/// Explicitly owned context shared by the pipeline, telemetry and observers.
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub bus: EventBus,
    pub devices: DeviceRegistry,
}

impl PipelineContext {
    pub fn new(bus: EventBus, devices: DeviceRegistry) -> Self {
        Self { bus, devices }
    }

    pub fn with_capacity(subscriber_capacity: usize) -> Self {
        Self::new(EventBus::new(subscriber_capacity), DeviceRegistry::new())
    }

    pub fn publish(&self, event: Event) {
        self.bus.publish(event);
    }
}

/// Cooperative stop flag for one run.
///
/// The pipeline samples it between task cycles and while waiting at the gate.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    stopped: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
