//! # Stampify Common Library
//!
//! Shared code for the Stampify scanner service and its tooling:
//! - Attendance models (stamps, passports, events, operators)
//! - Event types (ScanEvent enum) and the EventBus
//! - Configuration loading
//! - SSE helpers
//! - Lenient timestamp parsing for backend payloads

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
