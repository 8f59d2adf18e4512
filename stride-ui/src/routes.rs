//! HTTP route handlers for the pipeline API.

use std::collections::BTreeMap;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stride::core::types::{DeviceStatusRecord, ModelTier, Trigger};
use stride::events::Event;
use stride::io::model::Model;
use stride::telemetry::{TelemetryMessage, ingest};
use tracing::{debug, info, warn};

use crate::runs::{Launch, RunInfo, StartError};
use crate::state::AppState;

/// Build the API router.
pub fn api_router<M: Model + 'static>() -> Router<AppState<M>> {
    Router::new()
        .route("/health", get(health::<M>))
        .route("/devices", get(list_devices::<M>))
        .route("/devices/{device_id}", get(get_device::<M>))
        .route("/telemetry", post(post_telemetry::<M>))
        .route("/runs", post(start_run::<M>))
        .route("/runs/stop", post(stop_run::<M>))
}

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    status: &'static str,
    subscribers: usize,
    devices: usize,
    run_active: bool,
    run: Option<RunInfo>,
}

async fn health<M: Model + 'static>(State(state): State<AppState<M>>) -> Json<Health> {
    let run = state.runs.current();
    Json(Health {
        status: "ok",
        subscribers: state.ctx.bus.subscriber_count(),
        devices: state.ctx.devices.len(),
        run_active: run.is_some(),
        run,
    })
}

/// GET /api/devices - last known status of every device.
async fn list_devices<M: Model + 'static>(
    State(state): State<AppState<M>>,
) -> Json<BTreeMap<String, DeviceStatusRecord>> {
    Json(state.ctx.devices.all_statuses())
}

/// GET /api/devices/{device_id}
async fn get_device<M: Model + 'static>(
    State(state): State<AppState<M>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatusRecord>, StatusCode> {
    state
        .ctx
        .devices
        .get_status(&device_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/telemetry - store a device report and act on its trigger.
///
/// A `start` edge launches a run on the record's tier, or queues it behind a
/// run that is still stopping. A `stop` edge stops the active run. Malformed payloads are reported to observers as `error`
/// events and otherwise ignored.
async fn post_telemetry<M: Model + 'static>(
    State(state): State<AppState<M>>,
    body: String,
) -> Result<Json<DeviceStatusRecord>, (StatusCode, Json<Value>)> {
    let msg: TelemetryMessage = match serde_json::from_str(&body) {
        Ok(msg) => msg,
        Err(err) => {
            let message = format!("invalid telemetry payload: {err}");
            warn!(err = %err, "rejecting telemetry");
            state.ctx.publish(Event::error(message.clone()));
            return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": message }))));
        }
    };

    let record = ingest(&state.ctx, &msg);
    match record.trigger {
        Trigger::Start => match state.runs.start_or_queue(record.model_tier) {
            Ok(Launch::Started(run)) => {
                info!(run_id = run.run_id, device_id = %record.device_id, "run started by telemetry");
            }
            Ok(Launch::Queued { behind, .. }) => {
                info!(behind = behind.run_id, device_id = %record.device_id, "run queued by telemetry");
            }
            Err(StartError::AlreadyActive(run)) => {
                info!(run_id = run.run_id, device_id = %record.device_id, "start trigger ignored, run already active");
            }
        },
        Trigger::Stop => {
            if state.runs.stop().is_none() {
                debug!("stop trigger ignored, no active run");
            }
        }
        Trigger::None => {}
    }
    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartRequest {
    #[serde(default)]
    tier: Option<ModelTier>,
}

/// POST /api/runs - launch a run. Body `{ "tier": "high" }` is optional.
async fn start_run<M: Model + 'static>(
    State(state): State<AppState<M>>,
    body: Option<Json<StartRequest>>,
) -> Result<(StatusCode, Json<RunInfo>), (StatusCode, Json<Value>)> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let tier = request.tier.unwrap_or_else(|| state.runs.default_tier());
    match state.runs.start(tier) {
        Ok(run) => Ok((StatusCode::ACCEPTED, Json(run))),
        Err(StartError::AlreadyActive(run)) => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "a run is already active", "run": run })),
        )),
    }
}

/// POST /api/runs/stop - request the active run to stop between task cycles.
async fn stop_run<M: Model + 'static>(
    State(state): State<AppState<M>>,
) -> Result<Json<RunInfo>, StatusCode> {
    state.runs.stop().map(Json).ok_or(StatusCode::NOT_FOUND)
}
