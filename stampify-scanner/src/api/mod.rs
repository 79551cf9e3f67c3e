//! HTTP API for the scanner service

mod checkin;
mod health;
mod history;
mod scanner;
mod session;

pub use checkin::{checkin_routes, submit_image, submit_payload, CheckinRequest};
pub use health::{health_check, health_routes, HealthResponse};
pub use history::{get_history, get_stats, history_routes, refresh_now};
pub use scanner::{push_frame, scanner_routes, start_scanner, stop_scanner, FrameParams};
pub use session::{
    activate_event, event_stream, get_session, list_events, select_event, session_routes,
    SelectEventRequest,
};
