//! Attendance domain models
//!
//! These are the scanner's own view of the backend resources, flattened to the
//! attributes the check-in pipeline needs. Wire shapes live with the HTTP client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator role as reported by the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Scanner,
    Admin,
}

impl Role {
    /// Parse a backend role string (`"SCANNER"`, `"scanner"`, `"ROLE_ADMIN"`)
    pub fn from_wire(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        let lower = lower.strip_prefix("role_").unwrap_or(&lower);
        match lower {
            "member" => Some(Role::Member),
            "scanner" => Some(Role::Scanner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Roles allowed to record attendance
    pub fn can_check_in(self) -> bool {
        matches!(self, Role::Scanner | Role::Admin)
    }
}

/// The signed-in operator driving the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub organization_id: Option<i64>,
}

/// Currently selected event; fixed for the duration of one check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub id: i64,
    pub name: String,
}

impl fmt::Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// Selectable event as listed for the operator's organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: i64,
    pub name: String,
    pub venue: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<&EventSummary> for EventContext {
    fn from(event: &EventSummary) -> Self {
        Self {
            id: event.id,
            name: event.name.clone(),
        }
    }
}

/// Raw decoded text from one successful decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanPayload {
    pub text: String,
    pub decoded_at: DateTime<Utc>,
}

impl ScanPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            decoded_at: crate::time::now(),
        }
    }
}

/// Member identifier resolved from a scan payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberReference {
    pub member_id: String,
    pub display_name: String,
}

/// Passport owned by a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportRef {
    pub id: i64,
    /// Backend passport status (`ACTIVE`, `EXPIRED`, ...), if reported
    pub status: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl PassportRef {
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(false)
    }
}

/// Scan status attached to a stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(untagged)]
    Other(String),
}

impl ScanStatus {
    /// Case-insensitive parse; unknown statuses are kept verbatim
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "VALID" | "OK" => ScanStatus::Success,
            "PENDING" => ScanStatus::Pending,
            "FAILED" | "FAILURE" | "INVALID" => ScanStatus::Failed,
            _ => ScanStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            ScanStatus::Success => "SUCCESS",
            ScanStatus::Pending => "PENDING",
            ScanStatus::Failed => "FAILED",
            ScanStatus::Other(s) => s.as_str(),
        }
    }
}

/// Durable proof-of-attendance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampRecord {
    pub id: i64,
    pub passport_id: i64,
    pub event_id: i64,
    pub scanner_id: Option<i64>,
    pub member_id: Option<String>,
    pub member_name: Option<String>,
    pub event_name: Option<String>,
    pub stamped_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub valid: bool,
}

impl StampRecord {
    /// Whether this stamp counts towards the one-success-per-(passport, event) rule
    pub fn counts_as_attendance(&self) -> bool {
        self.status == ScanStatus::Success && self.valid
    }
}
