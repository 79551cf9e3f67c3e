//! Operator session, event selection and the event stream

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::{get, put},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use stampify_common::events::ScanEvent;
use stampify_common::models::{EventContext, EventSummary};
use std::convert::Infallible;
use tracing::{info, warn};

use crate::history::refresh_history;
use crate::session::Session;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SelectEventRequest {
    pub event_id: i64,
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> Json<Session> {
    Json(state.session.read().await.clone())
}

/// GET /events - events of the operator's organization
pub async fn list_events(State(state): State<AppState>) -> ApiResult<Json<Vec<EventSummary>>> {
    let org_id = organization_id(&state).await?;
    Ok(Json(state.api.events_for_organization(org_id).await?))
}

/// PUT /session/event
pub async fn select_event(
    State(state): State<AppState>,
    Json(req): Json<SelectEventRequest>,
) -> ApiResult<Json<EventContext>> {
    Ok(Json(activate_event(&state, req.event_id).await?))
}

/// GET /events/stream - SSE of scan events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    stampify_common::sse::create_event_bus_sse_stream(&state.event_bus, "stampify-scanner")
}

/// Make `event_id` the active event
///
/// The event must belong to the operator's organization. The history cache is
/// reset for the new event and refreshed once; a failed refresh is logged and
/// left to the periodic task.
pub async fn activate_event(state: &AppState, event_id: i64) -> ApiResult<EventContext> {
    let org_id = organization_id(state).await?;
    let events = state.api.events_for_organization(org_id).await?;
    let event = events
        .iter()
        .find(|e| e.id == event_id)
        .map(EventContext::from)
        .ok_or_else(|| {
            ApiError::NotFound(format!("event {} in organization {}", event_id, org_id))
        })?;

    let scanner_id = {
        let mut session = state.session.write().await;
        session.active_event = Some(event.clone());
        session.operator.id
    };
    state.history.write().await.reset(event.id);

    info!(event_id = event.id, event_name = %event.name, "Active event selected");
    state.event_bus.emit_lossy(ScanEvent::ActiveEventChanged {
        event_id: event.id,
        event_name: event.name.clone(),
        timestamp: stampify_common::time::now(),
    });

    if let Err(e) = refresh_history(
        state.api.as_ref(),
        &state.history,
        &state.event_bus,
        scanner_id,
        event.id,
    )
    .await
    {
        warn!(event_id = event.id, "Initial history load failed: {}", e);
    }

    Ok(event)
}

async fn organization_id(state: &AppState) -> ApiResult<i64> {
    state
        .session
        .read()
        .await
        .operator
        .organization_id
        .ok_or_else(|| ApiError::BadRequest("operator is not assigned to an organization".to_string()))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/event", put(select_event))
        .route("/events", get(list_events))
        .route("/events/stream", get(event_stream))
}
