//! Error types for the scanner HTTP surface

use crate::client::ClientError;
use crate::decoder::DecodeError;
use crate::live::LiveError;
use crate::orchestrator::CheckinError;
use crate::pipeline::ScanError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Operator may not perform this action (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Backend call failed (502)
    #[error("Backend error: {0}")]
    Upstream(#[from] ClientError),

    /// Scan could not be turned into a stamp
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Live scanner could not start
    #[error(transparent)]
    Live(#[from] LiveError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Live(LiveError::CameraBusy) => (StatusCode::CONFLICT, "CAMERA_BUSY"),
            ApiError::Scan(scan) => match scan {
                ScanError::Parse(_) => (StatusCode::BAD_REQUEST, "PARSE_ERROR"),
                ScanError::NoCodeDetected => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "NO_CODE_DETECTED")
                }
                ScanError::Decode(DecodeError::Worker(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DECODER_FAILED")
                }
                ScanError::Decode(_) => (StatusCode::BAD_REQUEST, "UNREADABLE_IMAGE"),
                ScanError::NoActiveEvent => (StatusCode::CONFLICT, "NO_ACTIVE_EVENT"),
                ScanError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                ScanError::Checkin(checkin) => match checkin {
                    CheckinError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    CheckinError::AlreadyCheckedIn { .. } => {
                        (StatusCode::CONFLICT, "ALREADY_CHECKED_IN")
                    }
                    CheckinError::CreateError { .. } => (StatusCode::BAD_GATEWAY, "CREATE_ERROR"),
                    CheckinError::Transport { .. } => {
                        (StatusCode::GATEWAY_TIMEOUT, "TRANSPORT_ERROR")
                    }
                    CheckinError::InFlight { .. } => (StatusCode::CONFLICT, "IN_FLIGHT"),
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
