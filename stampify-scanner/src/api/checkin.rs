//! Check-in endpoints: decoded text and uploaded images

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::pipeline::CheckinReceipt;
use crate::{ApiError, ApiResult, AppState};

/// Largest accepted image upload
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    /// Raw text decoded from the member's QR code
    pub payload: String,
}

/// POST /checkin
pub async fn submit_payload(
    State(state): State<AppState>,
    Json(req): Json<CheckinRequest>,
) -> ApiResult<Json<CheckinReceipt>> {
    Ok(Json(state.pipeline.submit_text(&req.payload).await?))
}

/// POST /scan/image - body is a PNG or JPEG
pub async fn submit_image(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<CheckinReceipt>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty image upload".to_string()));
    }
    let receipt = state
        .pipeline
        .submit_image(Arc::clone(&state.decoder), body.to_vec())
        .await?;
    Ok(Json(receipt))
}

pub fn checkin_routes() -> Router<AppState> {
    Router::new()
        .route("/checkin", post(submit_payload))
        .route(
            "/scan/image",
            post(submit_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}
