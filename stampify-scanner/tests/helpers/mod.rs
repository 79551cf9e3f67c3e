//! Test Helper Utilities
//!
//! Shared fixtures for the stampify-scanner integration tests
#![allow(dead_code)]

pub mod fake_api;
pub mod qr;
pub mod slow_decoder;

pub use fake_api::{CreateOutcome, FakeStampApi};
pub use qr::{blank_frame, blank_png, qr_frame, qr_png};
pub use slow_decoder::SlowDecoder;

use stampify_common::models::EventContext;
use stampify_scanner::orchestrator::OrchestrationContext;

pub fn gala_context() -> OrchestrationContext {
    OrchestrationContext {
        scanner_id: fake_api::SCANNER_ID,
        event: EventContext {
            id: fake_api::EVENT_ID,
            name: fake_api::EVENT_NAME.to_string(),
        },
    }
}
