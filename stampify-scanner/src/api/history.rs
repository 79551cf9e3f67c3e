//! Scan history endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use stampify_common::models::StampRecord;

use crate::history::{refresh_history, ScanStats};
use crate::pipeline::ScanError;
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub event_id: Option<i64>,
    pub records: Vec<StampRecord>,
}

/// GET /history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let history = state.history.read().await;
    Json(HistoryResponse {
        event_id: history.event_id(),
        records: history.records().to_vec(),
    })
}

/// GET /history/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<ScanStats> {
    let stats = state
        .history
        .read()
        .await
        .stats(stampify_common::time::now(), state.rate_window);
    Json(stats)
}

/// POST /history/refresh
pub async fn refresh_now(State(state): State<AppState>) -> ApiResult<Json<HistoryResponse>> {
    let ctx = state
        .session
        .read()
        .await
        .context()
        .ok_or(ScanError::NoActiveEvent)?;

    refresh_history(
        state.api.as_ref(),
        &state.history,
        &state.event_bus,
        ctx.scanner_id,
        ctx.event.id,
    )
    .await?;

    Ok(get_history(State(state)).await)
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/history", get(get_history))
        .route("/history/stats", get(get_stats))
        .route("/history/refresh", post(refresh_now))
}
