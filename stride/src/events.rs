//! Progress events and the fan-out bus that delivers them to observers.
//!
//! Every subscriber owns a bounded FIFO queue. Publishing never waits on a
//! subscriber: a queue that is full (or whose receiver went away) gets its
//! subscriber evicted after the publish pass, and later publishes never target
//! it again.
//!
//! ```text
//! publish(event)
//!     ├──► [queue 1] ──► Subscription 1 (SSE client)
//!     ├──► [queue 2] ──► Subscription 2
//!     └──► [queue N] full ──► evicted
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::core::types::{DeviceStatusRecord, ReviewResult, TaskDescriptor};

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Status reported in `task_status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Coding,
    Reviewing,
    Done,
    Revision,
    Waiting,
}

/// Event payloads, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Decomposition produced these tasks (all pending).
    Tasks { tasks: Vec<TaskDescriptor> },
    /// Decomposition produced an empty list.
    TaskList { tasks: Vec<TaskDescriptor> },
    TaskStatus {
        task_index: usize,
        status: ProgressStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ReviewResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        needs_revision: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision_count: Option<u32>,
    },
    /// A telemetry record was received and stored.
    Iot(DeviceStatusRecord),
    /// A pipeline run finished.
    Agent { response: String },
    Error { message: String },
    /// Transport keepalive. Never published through the bus.
    Ping,
}

/// A published event: a flat record with a `type` tag and a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: None,
        }
    }

    pub fn task_status(task_index: usize, status: ProgressStatus) -> Self {
        Self::new(EventKind::TaskStatus {
            task_index,
            status,
            result: None,
            comment: None,
            needs_revision: None,
            revision_count: None,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error {
            message: message.into(),
        })
    }

    pub fn ping() -> Self {
        Self::new(EventKind::Ping)
    }

    /// The wire `type` tag.
    pub fn type_tag(&self) -> &'static str {
        match &self.kind {
            EventKind::Tasks { .. } => "tasks",
            EventKind::TaskList { .. } => "task_list",
            EventKind::TaskStatus { .. } => "task_status",
            EventKind::Iot(_) => "iot",
            EventKind::Agent { .. } => "agent",
            EventKind::Error { .. } => "error",
            EventKind::Ping => "ping",
        }
    }

    /// Serialize to the flat JSON record sent to observers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Opaque identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct BusInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Event>>>,
}

/// Fan-out bus with one bounded queue per subscriber.
///
/// Cheap to clone; clones share the subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus whose subscriber queues hold `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber. Dropping the returned handle unsubscribes it.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry().insert(id, tx);
        debug!(subscriber = id.0, "subscriber registered");
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry().remove(&id).is_some() {
            debug!(subscriber = id.0, "subscriber removed");
        }
    }

    /// Deliver `event` to every subscriber without blocking.
    ///
    /// Stamps a timestamp if the event has none. Subscribers whose queue is
    /// full or closed are evicted once the pass completes.
    pub fn publish(&self, mut event: Event) {
        let mut subscribers = self.registry();
        if subscribers.is_empty() {
            return;
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(now_rfc3339());
        }

        let mut failed = Vec::new();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id.0, event = event.type_tag(), "subscriber queue full, evicting");
                    failed.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = id.0, "subscriber closed, evicting");
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Event>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle through which one observer drains its queue.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the subscriber has been
    /// evicted and its queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
