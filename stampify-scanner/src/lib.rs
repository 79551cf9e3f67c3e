//! stampify-scanner library
//!
//! Check-in pipeline for event staff: QR frames or uploads are decoded, the
//! payload is resolved to a member, and a stamp is created against the
//! attendance backend. A small local HTTP/SSE surface drives it.

pub mod api;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod history;
pub mod live;
pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use crate::client::StampApi;
use crate::decoder::{CodeDecoder, QrDecoder};
use crate::history::{ScanHistory, SharedHistory};
use crate::live::{Camera, FramePublisher, LiveSession, LiveSettings};
use crate::orchestrator::{CheckinOrchestrator, OrchestratorSettings};
use crate::payload::PayloadParser;
use crate::pipeline::ScanPipeline;
use crate::session::Session;
use axum::Router;
use chrono::{DateTime, Utc};
use stampify_common::config::IdFormat;
use stampify_common::events::EventBus;
use stampify_common::models::Operator;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Running live scan plus the slot its frames are pushed into
pub struct LiveHandle {
    pub session: LiveSession,
    pub frames: FramePublisher,
}

/// Pipeline tuning gathered from config
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSettings {
    pub orchestrator: OrchestratorSettings,
    pub member_id_format: IdFormat,
    pub live: LiveSettings,
    pub rate_window_mins: u32,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn StampApi>,
    pub pipeline: Arc<ScanPipeline>,
    pub session: Arc<RwLock<Session>>,
    pub history: SharedHistory,
    pub event_bus: EventBus,
    pub decoder: Arc<dyn CodeDecoder>,
    pub camera: Camera,
    pub live: Arc<Mutex<Option<LiveHandle>>>,
    pub live_settings: LiveSettings,
    pub rate_window: chrono::Duration,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        api: Arc<dyn StampApi>,
        operator: Operator,
        event_bus: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        let session = Arc::new(RwLock::new(Session::new(operator)));
        let history: SharedHistory = Arc::new(RwLock::new(ScanHistory::new()));
        let orchestrator =
            CheckinOrchestrator::new(Arc::clone(&api), event_bus.clone(), settings.orchestrator);
        let pipeline = ScanPipeline::new(
            PayloadParser::new(settings.member_id_format),
            orchestrator,
            Arc::clone(&session),
            Arc::clone(&history),
            event_bus.clone(),
        );

        Self {
            api,
            pipeline: Arc::new(pipeline),
            session,
            history,
            event_bus,
            decoder: Arc::new(QrDecoder::new()),
            camera: Camera::new(),
            live: Arc::new(Mutex::new(None)),
            live_settings: settings.live,
            rate_window: chrono::Duration::minutes(i64::from(settings.rate_window_mins.max(1))),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// CORS is permissive: the operator UI runs from its own origin on the same machine.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::session_routes())
        .merge(api::checkin_routes())
        .merge(api::scanner_routes())
        .merge(api::history_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
