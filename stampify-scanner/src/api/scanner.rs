//! Live scanner control and frame intake

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::decoder::Frame;
use crate::live::{frame_channel, start_live_scan, LiveError};
use crate::{ApiError, ApiResult, AppState, LiveHandle};

/// 1920x1080 greyscale plus headroom
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct FrameParams {
    pub width: usize,
    pub height: usize,
}

/// POST /scanner/start
pub async fn start_scanner(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    {
        let session = state.session.read().await;
        if !session.can_check_in() {
            return Err(ApiError::Forbidden(format!(
                "role {:?} cannot run the scanner",
                session.operator.role
            )));
        }
    }

    let mut live = state.live.lock().await;
    if live.as_ref().is_some_and(|h| h.session.is_running()) {
        return Err(LiveError::CameraBusy.into());
    }

    let (frames, feed) = frame_channel();
    let session = start_live_scan(
        &state.camera,
        feed,
        Arc::clone(&state.decoder),
        Arc::clone(&state.pipeline),
        state.event_bus.clone(),
        state.live_settings,
    )?;
    *live = Some(LiveHandle { session, frames });

    info!("Live scanner started via API");
    Ok(Json(json!({ "running": true })))
}

/// POST /scanner/stop
pub async fn stop_scanner(State(state): State<AppState>) -> Json<Value> {
    let handle = state.live.lock().await.take();
    let was_running = match handle {
        Some(handle) => {
            handle.session.stop().await;
            true
        }
        None => false,
    };
    Json(json!({ "running": false, "stopped": was_running }))
}

/// POST /scanner/frame?width=W&height=H - body is W*H greyscale bytes
pub async fn push_frame(
    State(state): State<AppState>,
    Query(params): Query<FrameParams>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let frame = Frame::from_luma(params.width, params.height, body.to_vec())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let live = state.live.lock().await;
    match live.as_ref() {
        Some(handle) if handle.session.is_running() => {
            handle.frames.publish(frame);
            Ok(StatusCode::ACCEPTED)
        }
        _ => Err(ApiError::BadRequest("live scanner is not running".to_string())),
    }
}

pub fn scanner_routes() -> Router<AppState> {
    Router::new()
        .route("/scanner/start", post(start_scanner))
        .route("/scanner/stop", post(stop_scanner))
        .route(
            "/scanner/frame",
            post(push_frame).layer(DefaultBodyLimit::max(MAX_FRAME_BYTES)),
        )
}
