//! In-memory attendance backend

use async_trait::async_trait;
use stampify_common::models::{
    EventSummary, Operator, PassportRef, Role, ScanStatus, StampRecord,
};
use stampify_scanner::client::{ClientError, NewStamp, StampApi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const SCANNER_ID: i64 = 5;
pub const ORG_ID: i64 = 1;
pub const EVENT_ID: i64 = 3;
pub const EVENT_NAME: &str = "Spring Gala";
pub const MEMBER_ID: &str = "42";
pub const PASSPORT_ID: i64 = 7;

/// How the fake answers `create_stamp`
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Accept,
    Status(u16, String),
    Network(String),
    Decode(String),
}

pub struct FakeStampApi {
    operator: Mutex<Operator>,
    events: Vec<EventSummary>,
    passports: Mutex<HashMap<String, Vec<PassportRef>>>,
    stamps: Mutex<Vec<StampRecord>>,
    next_id: AtomicI64,
    outcome: Mutex<CreateOutcome>,
    /// Server-side uniqueness: a second success for the same pair is a 409
    enforce_unique: bool,
    lookup_delay: Duration,
    create_delay: Duration,
    pub create_calls: AtomicUsize,
    pub duplicate_checks: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeStampApi {
    /// Member 42 holds passport 7; event 3 belongs to org 1
    pub fn new() -> Self {
        let mut passports = HashMap::new();
        passports.insert(
            MEMBER_ID.to_string(),
            vec![PassportRef {
                id: PASSPORT_ID,
                status: Some("ACTIVE".to_string()),
                issued_at: None,
            }],
        );

        Self {
            operator: Mutex::new(operator(Role::Scanner)),
            events: vec![EventSummary {
                id: EVENT_ID,
                name: EVENT_NAME.to_string(),
                venue: Some("Main Hall".to_string()),
                scheduled_at: None,
            }],
            passports: Mutex::new(passports),
            stamps: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            outcome: Mutex::new(CreateOutcome::Accept),
            enforce_unique: true,
            lookup_delay: Duration::ZERO,
            create_delay: Duration::ZERO,
            create_calls: AtomicUsize::new(0),
            duplicate_checks: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_role(self, role: Role) -> Self {
        *self.operator.lock().unwrap() = operator(role);
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn without_unique_constraint(mut self) -> Self {
        self.enforce_unique = false;
        self
    }

    pub fn set_outcome(&self, outcome: CreateOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn add_passport(&self, member_id: &str, passport: PassportRef) {
        self.passports
            .lock()
            .unwrap()
            .entry(member_id.to_string())
            .or_default()
            .push(passport);
    }

    /// Put a stamp on the server as if another device had recorded it
    pub fn seed_stamp(&self, passport_id: i64, event_id: i64, valid: bool) -> StampRecord {
        let record = StampRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            passport_id,
            event_id,
            scanner_id: Some(SCANNER_ID),
            member_id: Some(MEMBER_ID.to_string()),
            member_name: Some("Alex Johnson".to_string()),
            event_name: Some(EVENT_NAME.to_string()),
            stamped_at: Some(stampify_common::time::now()),
            status: ScanStatus::Success,
            valid,
        };
        self.stamps.lock().unwrap().push(record.clone());
        record
    }

    pub fn stamp_count(&self) -> usize {
        self.stamps.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

fn operator(role: Role) -> Operator {
    Operator {
        id: SCANNER_ID,
        name: "Door Staff".to_string(),
        email: Some("door@example.org".to_string()),
        role,
        organization_id: Some(ORG_ID),
    }
}

#[async_trait]
impl StampApi for FakeStampApi {
    async fn passports_for_member(&self, member_id: &str) -> Result<Vec<PassportRef>, ClientError> {
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        Ok(self
            .passports
            .lock()
            .unwrap()
            .get(member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn stamps_for_passport_event(
        &self,
        passport_id: i64,
        event_id: i64,
    ) -> Result<Vec<StampRecord>, ClientError> {
        self.duplicate_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .stamps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.passport_id == passport_id && s.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn create_stamp(&self, stamp: &NewStamp) -> Result<StampRecord, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let outcome = self.outcome.lock().unwrap().clone();
        match outcome {
            CreateOutcome::Accept => {}
            CreateOutcome::Status(status, message) => {
                return Err(ClientError::Status { status, message })
            }
            CreateOutcome::Network(message) => return Err(ClientError::Network(message)),
            CreateOutcome::Decode(message) => return Err(ClientError::Decode(message)),
        }

        let mut stamps = self.stamps.lock().unwrap();
        if self.enforce_unique
            && stamps.iter().any(|s| {
                s.passport_id == stamp.passport_id
                    && s.event_id == stamp.event_id
                    && s.counts_as_attendance()
            })
        {
            return Err(ClientError::Status {
                status: 409,
                message: "Stamp already exists for this passport and event".to_string(),
            });
        }

        // display fields are left for the client to fill in
        let record = StampRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            passport_id: stamp.passport_id,
            event_id: stamp.event_id,
            scanner_id: Some(stamp.scanner_id),
            member_id: None,
            member_name: None,
            event_name: None,
            stamped_at: None,
            status: stamp.scan_status.clone(),
            valid: true,
        };
        stamps.push(record.clone());
        Ok(record)
    }

    async fn stamps_for_scanner(&self, scanner_id: i64) -> Result<Vec<StampRecord>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .stamps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.scanner_id == Some(scanner_id))
            .cloned()
            .collect())
    }

    async fn events_for_organization(&self, org_id: i64) -> Result<Vec<EventSummary>, ClientError> {
        if org_id == ORG_ID {
            Ok(self.events.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn current_user(&self) -> Result<Operator, ClientError> {
        Ok(self.operator.lock().unwrap().clone())
    }
}
