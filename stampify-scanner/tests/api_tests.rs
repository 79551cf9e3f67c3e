//! Integration tests for the stampify-scanner HTTP surface
//!
//! Tests cover:
//! - Health endpoint
//! - Event selection and session
//! - Check-in by payload and by image upload, with error mapping
//! - History and statistics
//! - Live scanner control

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use helpers::fake_api::{EVENT_ID, MEMBER_ID, PASSPORT_ID};
use helpers::{blank_png, qr_png, FakeStampApi, SlowDecoder};
use serde_json::{json, Value};
use stampify_common::events::EventBus;
use stampify_common::models::Role;
use stampify_scanner::client::StampApi;
use stampify_scanner::decoder::CodeDecoder;
use stampify_scanner::pipeline::ScanError;
use stampify_scanner::{build_router, AppState, PipelineSettings};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app backed by the in-memory backend
async fn setup_app(api: Arc<FakeStampApi>) -> Router {
    let operator = api.current_user().await.unwrap();
    let state = AppState::new(api, operator, EventBus::new(64), PipelineSettings::default());
    build_router(state)
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bytes_request(uri: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn select_gala(app: &Router) {
    let response = app
        .clone()
        .oneshot(json_request("PUT", "/session/event", json!({ "event_id": EVENT_ID })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Health and session
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app.oneshot(test_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "stampify-scanner");
    assert_eq!(body["camera_available"], true);
}

#[tokio::test]
async fn test_select_event_updates_session() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app
        .clone()
        .oneshot(json_request("PUT", "/session/event", json!({ "event_id": EVENT_ID })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["name"], "Spring Gala");

    let response = app.oneshot(test_request("GET", "/session")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["active_event"]["id"], EVENT_ID);
    assert_eq!(body["operator"]["role"], "scanner");
}

#[tokio::test]
async fn test_select_foreign_event_is_not_found() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app
        .oneshot(json_request("PUT", "/session/event", json!({ "event_id": 77 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_events() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app.oneshot(test_request("GET", "/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["venue"], "Main Hall");
}

// =============================================================================
// Check-in
// =============================================================================

#[tokio::test]
async fn test_checkin_requires_active_event() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app
        .oneshot(json_request("POST", "/checkin", json!({ "payload": MEMBER_ID })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NO_ACTIVE_EVENT");
}

#[tokio::test]
async fn test_checkin_then_duplicate() {
    let api = Arc::new(FakeStampApi::new());
    let app = setup_app(Arc::clone(&api)).await;
    select_gala(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/checkin",
            json!({ "payload": r#"{"id": 42, "name": "Alex Johnson"}"# }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["member"]["member_id"], MEMBER_ID);
    assert_eq!(body["stamp"]["passport_id"], PASSPORT_ID);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkin", json!({ "payload": "member:42" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "ALREADY_CHECKED_IN");
    assert!(body["error"]["message"].as_str().unwrap().contains("Member 42"));

    assert_eq!(api.creates(), 1);

    let response = app.oneshot(test_request("GET", "/history")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["event_id"], EVENT_ID);
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let api = Arc::new(FakeStampApi::new());
    let app = setup_app(Arc::clone(&api)).await;
    select_gala(&app).await;

    let response = app
        .oneshot(json_request("POST", "/checkin", json!({ "payload": "hello world" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PARSE_ERROR");
    assert_eq!(api.creates(), 0);
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;
    select_gala(&app).await;

    let response = app
        .oneshot(json_request("POST", "/checkin", json!({ "payload": "999" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_member_role_cannot_check_in() {
    let api = Arc::new(FakeStampApi::new().with_role(Role::Member));
    let app = setup_app(Arc::clone(&api)).await;
    select_gala(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkin", json!({ "payload": MEMBER_ID })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(test_request("POST", "/scanner/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(api.creates(), 0);
}

#[tokio::test]
async fn test_image_upload_checks_in() {
    let api = Arc::new(FakeStampApi::new());
    let app = setup_app(Arc::clone(&api)).await;
    select_gala(&app).await;

    let response = app
        .oneshot(bytes_request("/scan/image", qr_png(MEMBER_ID)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["member"]["member_id"], MEMBER_ID);
    assert_eq!(api.creates(), 1);
}

#[tokio::test]
async fn test_image_without_code_is_unprocessable() {
    let api = Arc::new(FakeStampApi::new());
    let app = setup_app(Arc::clone(&api)).await;
    select_gala(&app).await;

    let response = app
        .clone()
        .oneshot(bytes_request("/scan/image", blank_png()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NO_CODE_DETECTED");

    let response = app
        .oneshot(bytes_request("/scan/image", b"not an image".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(api.creates(), 0);
}

#[tokio::test]
async fn test_image_decode_does_not_block_runtime() {
    let api = Arc::new(FakeStampApi::new());
    let operator = api.current_user().await.unwrap();
    let state = AppState::new(api, operator, EventBus::new(16), PipelineSettings::default());
    let decoder = Arc::new(SlowDecoder::blank(Duration::from_millis(300)));

    let pipeline = Arc::clone(&state.pipeline);
    let worker = Arc::clone(&decoder) as Arc<dyn CodeDecoder>;
    let upload = tokio::spawn(async move { pipeline.submit_image(worker, blank_png()).await });

    // the single-threaded test runtime still gets to run while the decode sleeps
    decoder.wait_started().await;
    assert!(!decoder.finished());

    let result = upload.await.unwrap();
    assert!(matches!(result, Err(ScanError::NoCodeDetected)));
    assert!(decoder.finished());
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_stats_and_refresh() {
    let api = Arc::new(FakeStampApi::new());
    let app = setup_app(Arc::clone(&api)).await;

    // no event yet
    let response = app
        .clone()
        .oneshot(test_request("POST", "/history/refresh"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    select_gala(&app).await;
    api.seed_stamp(PASSPORT_ID, EVENT_ID, true);

    let response = app
        .clone()
        .oneshot(test_request("POST", "/history/refresh"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 1);

    let response = app.oneshot(test_request("GET", "/history/stats")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["today"], 1);
    assert_eq!(body["unique_members"], 1);
    assert_eq!(body["success_rate"], 100);
}

// =============================================================================
// Live scanner
// =============================================================================

#[tokio::test]
async fn test_scanner_start_stop_and_busy() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app
        .clone()
        .oneshot(test_request("POST", "/scanner/start"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(test_request("POST", "/scanner/start"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "CAMERA_BUSY");

    let response = app
        .clone()
        .oneshot(test_request("POST", "/scanner/stop"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["stopped"], true);

    let response = app.oneshot(test_request("GET", "/health")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["camera_available"], true);
}

#[tokio::test]
async fn test_frame_push_requires_running_scanner() {
    let app = setup_app(Arc::new(FakeStampApi::new())).await;

    let response = app
        .clone()
        .oneshot(bytes_request("/scanner/frame?width=4&height=4", vec![255; 16]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.clone()
        .oneshot(test_request("POST", "/scanner/start"))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(bytes_request("/scanner/frame?width=4&height=4", vec![255; 16]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // wrong size for the declared dimensions
    let response = app
        .clone()
        .oneshot(bytes_request("/scanner/frame?width=4&height=4", vec![255; 10]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.oneshot(test_request("POST", "/scanner/stop")).await.unwrap();
}
