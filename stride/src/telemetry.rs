//! Device telemetry ingestion.
//!
//! Each message updates the device registry and is re-published as an `iot`
//! event. Start/stop triggers are derived from the previous record of the same
//! device, so repeated reports of an unchanged status never re-trigger.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::context::PipelineContext;
use crate::core::activity::{Activity, detect_trigger};
use crate::core::types::{DeviceStatusRecord, Trigger};
use crate::events::{Event, EventKind, now_rfc3339};

/// Telemetry payload as published by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub device_id: String,
    /// Activity tag: `Run`, `Walk` or `None`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    /// Device-side timestamp; replaced by the receive time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
}

/// Store `msg` and publish it. Returns the stored record.
#[instrument(skip_all, fields(device_id = %msg.device_id, status = %msg.status))]
pub fn ingest(ctx: &PipelineContext, msg: &TelemetryMessage) -> DeviceStatusRecord {
    let activity = Activity::from_tag(&msg.status);
    let timestamp = msg
        .timestamp
        .as_ref()
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(now_rfc3339);

    let record = ctx.devices.upsert_with(&msg.device_id, |previous| {
        let was_active = previous.is_some_and(|p| p.is_active);
        DeviceStatusRecord {
            device_id: msg.device_id.clone(),
            raw_status: msg.status.clone(),
            is_active: activity.is_active(),
            trigger: detect_trigger(was_active, activity.is_active()),
            model_tier: activity.tier(),
            timestamp,
        }
    });

    if record.trigger != Trigger::None {
        info!(trigger = ?record.trigger, tier = %record.model_tier, "activity edge");
    }
    ctx.publish(Event::new(EventKind::Iot(record.clone())));
    record
}
