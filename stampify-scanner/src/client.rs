//! Attendance backend client
//!
//! `StampApi` is the seam between the check-in pipeline and the REST backend;
//! `HttpStampApi` is the reqwest implementation. Every request carries the
//! configured session cookie and is bounded by the client timeout.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stampify_common::models::{
    EventSummary, Operator, PassportRef, Role, ScanStatus, StampRecord,
};
use stampify_common::time::deserialize_lenient;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("stampify-scanner/", env!("CARGO_PKG_VERSION"));

/// Backend client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection failure or request timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status with the server's message
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

/// Create-stamp request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStamp {
    pub passport_id: i64,
    pub event_id: i64,
    pub scanner_id: i64,
    pub scan_status: ScanStatus,
}

/// Operations the check-in pipeline needs from the backend
#[async_trait]
pub trait StampApi: Send + Sync {
    /// GET /passports/member/{memberId}
    async fn passports_for_member(&self, member_id: &str) -> Result<Vec<PassportRef>, ClientError>;

    /// GET /stamps/passport/{passportId}/event/{eventId}
    async fn stamps_for_passport_event(
        &self,
        passport_id: i64,
        event_id: i64,
    ) -> Result<Vec<StampRecord>, ClientError>;

    /// POST /stamps?userId={scannerId}
    async fn create_stamp(&self, stamp: &NewStamp) -> Result<StampRecord, ClientError>;

    /// GET /stamps/scanner/{scannerId}
    async fn stamps_for_scanner(&self, scanner_id: i64) -> Result<Vec<StampRecord>, ClientError>;

    /// GET /events/organization/{orgId}
    async fn events_for_organization(&self, org_id: i64) -> Result<Vec<EventSummary>, ClientError>;

    /// GET /users/me
    async fn current_user(&self) -> Result<Operator, ClientError>;
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgDto {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    organization: Option<OrgDto>,
}

impl UserDto {
    fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PassportDto {
    id: i64,
    #[serde(default)]
    member: Option<UserDto>,
    #[serde(default)]
    passport_status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    issued_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<PassportDto> for PassportRef {
    fn from(dto: PassportDto) -> Self {
        Self {
            id: dto.id,
            status: dto.passport_status,
            issued_at: dto.issued_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDto {
    id: i64,
    #[serde(default, alias = "name")]
    event_name: Option<String>,
    #[serde(default)]
    venue_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<EventDto> for EventSummary {
    fn from(dto: EventDto) -> Self {
        Self {
            id: dto.id,
            name: dto.event_name.unwrap_or_else(|| format!("Event {}", dto.id)),
            venue: dto.venue_name,
            scheduled_at: dto.scheduled_at,
        }
    }
}

/// Stamps arrive either with nested resources or with flat foreign keys
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StampDto {
    id: i64,
    #[serde(default)]
    passport: Option<PassportDto>,
    #[serde(default)]
    passport_id: Option<i64>,
    #[serde(default)]
    event: Option<EventDto>,
    #[serde(default)]
    event_id: Option<i64>,
    #[serde(default)]
    scanner: Option<UserDto>,
    #[serde(default)]
    scanner_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    stamped_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    scan_status: Option<String>,
    #[serde(default)]
    valid: Option<bool>,
}

impl StampDto {
    fn into_record(self) -> Result<StampRecord, ClientError> {
        let passport_id = self
            .passport
            .as_ref()
            .map(|p| p.id)
            .or(self.passport_id)
            .ok_or_else(|| ClientError::Decode(format!("stamp {} has no passport", self.id)))?;
        let event_id = self
            .event
            .as_ref()
            .map(|e| e.id)
            .or(self.event_id)
            .ok_or_else(|| ClientError::Decode(format!("stamp {} has no event", self.id)))?;

        let member = self.passport.as_ref().and_then(|p| p.member.as_ref());

        Ok(StampRecord {
            id: self.id,
            passport_id,
            event_id,
            scanner_id: self.scanner.as_ref().map(|s| s.id).or(self.scanner_id),
            member_id: member.map(|m| m.id.to_string()),
            member_name: member.and_then(UserDto::display_name),
            event_name: self.event.and_then(|e| e.event_name),
            stamped_at: self.stamped_at.or(self.created_at),
            status: self
                .scan_status
                .as_deref()
                .map(ScanStatus::from_wire)
                .unwrap_or(ScanStatus::Success),
            valid: self.valid.unwrap_or(true),
        })
    }
}

/// Decode a stamp listing that may be `null`, a single object or an array
fn stamps_from_value(value: Value) -> Result<Vec<StampRecord>, ClientError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(ClientError::Decode(format!(
                "expected stamp list, got {}",
                other
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<StampDto>(item)
                .map_err(|e| ClientError::Decode(e.to_string()))?
                .into_record()
        })
        .collect()
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// reqwest-backed backend client
pub struct HttpStampApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpStampApi {
    /// Build a client for `base_url` (e.g. `https://host/api`)
    ///
    /// `session_cookie` is sent verbatim as the `Cookie` header.
    pub fn new(
        base_url: &str,
        session_cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie.filter(|c| !c.trim().is_empty()) {
            let mut value = HeaderValue::from_str(cookie.trim())
                .map_err(|e| ClientError::Network(format!("invalid session cookie: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "GET");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_list<T, D>(&self, path: &str) -> Result<Vec<T>, ClientError>
    where
        D: for<'de> Deserialize<'de> + Into<T>,
    {
        match self.get_json(path).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value::<Vec<D>>(value)
                .map(|items| items.into_iter().map(Into::into).collect())
                .map_err(|e| ClientError::Decode(e.to_string())),
        }
    }
}

/// Read the error body, preferring a JSON `message`/`error` field over raw text
async fn status_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(text);

    ClientError::Status {
        status: status.as_u16(),
        message: if message.trim().is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            message
        },
    }
}

#[async_trait]
impl StampApi for HttpStampApi {
    async fn passports_for_member(&self, member_id: &str) -> Result<Vec<PassportRef>, ClientError> {
        self.get_list::<PassportRef, PassportDto>(&format!("/passports/member/{}", member_id))
            .await
    }

    async fn stamps_for_passport_event(
        &self,
        passport_id: i64,
        event_id: i64,
    ) -> Result<Vec<StampRecord>, ClientError> {
        let path = format!("/stamps/passport/{}/event/{}", passport_id, event_id);
        match self.get_json(&path).await? {
            None => Ok(Vec::new()),
            Some(value) => stamps_from_value(value),
        }
    }

    async fn create_stamp(&self, stamp: &NewStamp) -> Result<StampRecord, ClientError> {
        let url = self.url("/stamps");
        debug!(url = %url, passport_id = stamp.passport_id, event_id = stamp.event_id, "POST");

        let response = self
            .http_client
            .post(&url)
            .query(&[("userId", stamp.scanner_id)])
            .json(stamp)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let value: Value = response.json().await?;
        stamps_from_value(value)?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode("create returned no stamp".to_string()))
    }

    async fn stamps_for_scanner(&self, scanner_id: i64) -> Result<Vec<StampRecord>, ClientError> {
        match self.get_json(&format!("/stamps/scanner/{}", scanner_id)).await? {
            None => Ok(Vec::new()),
            Some(value) => stamps_from_value(value),
        }
    }

    async fn events_for_organization(&self, org_id: i64) -> Result<Vec<EventSummary>, ClientError> {
        self.get_list::<EventSummary, EventDto>(&format!("/events/organization/{}", org_id))
            .await
    }

    async fn current_user(&self) -> Result<Operator, ClientError> {
        let value = self
            .get_json("/users/me")
            .await?
            .ok_or_else(|| ClientError::Status {
                status: 404,
                message: "current user not found".to_string(),
            })?;
        let user: UserDto =
            serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;

        let role = user
            .role
            .as_deref()
            .and_then(Role::from_wire)
            .ok_or_else(|| {
                ClientError::Decode(format!("unknown role {:?}", user.role.as_deref()))
            })?;

        Ok(Operator {
            id: user.id,
            name: user
                .display_name()
                .unwrap_or_else(|| format!("User {}", user.id)),
            email: user.email.clone(),
            role,
            organization_id: user.organization.as_ref().map(|o| o.id),
        })
    }
}
