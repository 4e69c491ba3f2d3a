//! HTTP surface: field-device endpoints, dashboard reads and the MJPEG feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use leafguard_core::{
    ActivityEntry, IrrigationController, IrrigationDecision, PreviewFeed, StatusReport, VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::error::ApiError;

pub const MJPEG_BOUNDARY: &str = "frame";

#[derive(Clone)]
pub struct AppState {
    controller: Arc<IrrigationController>,
    preview: PreviewFeed,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        controller: Arc<IrrigationController>,
        preview: PreviewFeed,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            controller,
            preview,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(process))
        .route("/dht22", post(dht22))
        .route("/force_spray", post(force_spray))
        .route("/logs", get(logs))
        .route("/status", get(status))
        .route("/video_feed", get(video_feed))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct MoistureBody {
    pub moisture: f64,
}

#[derive(Debug, Deserialize)]
pub struct ClimateBody {
    pub temperature: f64,
    pub humidity: f64,
}

/// Decision plus the field names the device client reads.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub decision: IrrigationDecision,
    pub motor_command: &'static str,
    pub duration: f64,
}

impl From<IrrigationDecision> for ProcessResponse {
    fn from(decision: IrrigationDecision) -> Self {
        Self {
            motor_command: decision.motor_command(),
            duration: decision.duration_seconds,
            decision,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(flatten)]
    pub status: StatusReport,
}

async fn process(
    State(state): State<AppState>,
    Json(body): Json<MoistureBody>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let report = state
        .controller
        .process_moisture(body.moisture, Utc::now())
        .await?;
    Ok(Json(report.decision.into()))
}

async fn dht22(
    State(state): State<AppState>,
    Json(body): Json<ClimateBody>,
) -> Result<Json<Value>, ApiError> {
    state
        .controller
        .ingest_climate(body.temperature, body.humidity, Utc::now())?;
    Ok(Json(json!({ "status": "received" })))
}

async fn force_spray(State(state): State<AppState>) -> Json<Value> {
    state.controller.request_manual_spray();
    Json(json!({ "status": "queued" }))
}

async fn logs(State(state): State<AppState>) -> Json<Vec<ActivityEntry>> {
    Json(state.controller.activity().snapshot())
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: VERSION,
        status: state.controller.status(Utc::now()),
    })
}

async fn video_feed(State(state): State<AppState>) -> Response {
    let stream = mjpeg_stream(state.preview.subscribe(), state.shutdown.clone());
    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

/// One multipart part per published preview. Ends when the frame loop stops
/// publishing or shutdown begins.
fn mjpeg_stream(
    preview: watch::Receiver<leafguard_core::Preview>,
    shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
    futures::stream::unfold(
        (preview, shutdown, false),
        |(mut preview, mut shutdown, mut waited)| async move {
            loop {
                if waited {
                    tokio::select! {
                        changed = preview.changed() => changed.ok()?,
                        _ = shutdown.changed() => return None,
                    }
                }
                waited = true;
                let jpeg = preview.borrow_and_update().clone();
                if let Some(jpeg) = jpeg {
                    return Some((Ok(multipart_part(&jpeg)), (preview, shutdown, true)));
                }
            }
        },
    )
}

fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafguard_core::DecisionReason;

    #[test]
    fn process_response_keeps_device_field_names() {
        let decision = IrrigationDecision::irrigate(3.5, DecisionReason::Triggered);
        let body = serde_json::to_value(ProcessResponse::from(decision)).unwrap();
        assert_eq!(body["should_irrigate"], true);
        assert_eq!(body["duration_seconds"], 3.5);
        assert_eq!(body["reason"], "triggered");
        assert_eq!(body["motor_command"], "RUN");
        assert_eq!(body["duration"], 3.5);
    }

    #[test]
    fn multipart_part_is_framed() {
        let part = multipart_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
