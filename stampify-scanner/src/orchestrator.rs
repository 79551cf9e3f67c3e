//! Check-in orchestrator
//!
//! Drives one check-in attempt through its state machine:
//!
//! ```text
//! IDLE → RESOLVING_PASSPORT → CHECKING_DUPLICATE → CREATING_STAMP → DONE
//!              ↓ none               ↓ exists              ↓ rejected
//!          NotFound          AlreadyCheckedIn     AlreadyCheckedIn / CreateError
//! ```
//!
//! Steps run strictly in order, each bounded by the step timeout. A network
//! failure or timeout at any step ends the run with `Transport`. There is no
//! automatic retry: the operator re-scans.
//!
//! At most one run per (member, event) is in flight. A second request for the
//! same pair is rejected with `InFlight` while the first runs; the marker is
//! released by a drop guard on every exit path.

use crate::client::{ClientError, NewStamp, StampApi};
use stampify_common::config::{DuplicateCheck, PassportPolicy};
use stampify_common::events::{CheckinState, EventBus, FailureKind, ScanEvent};
use stampify_common::models::{EventContext, MemberReference, PassportRef, ScanStatus, StampRecord};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Substrings in a rejected create that mean "already stamped"
const DUPLICATE_MARKERS: &[&str] = &["already", "duplicate"];

/// Explicit per-run context; never read from global session state mid-run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationContext {
    pub scanner_id: i64,
    pub event: EventContext,
}

/// Orchestrator tuning
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub passport_policy: PassportPolicy,
    pub duplicate_check: DuplicateCheck,
    pub step_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            passport_policy: PassportPolicy::default(),
            duplicate_check: DuplicateCheck::default(),
            step_timeout: Duration::from_secs(5),
        }
    }
}

/// Terminal failure of a check-in run
///
/// Messages are written for the operator at the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckinError {
    #[error("No passport found for member {member_id}; ask the member to register or use manual check-in")]
    NotFound { member_id: String },

    #[error("{member_name} (member {member_id}) is already checked in to {event_name}")]
    AlreadyCheckedIn {
        member_id: String,
        member_name: String,
        event_name: String,
    },

    #[error("Check-in for member {member_id} at {event_name} was rejected by the server: {message}")]
    CreateError {
        member_id: String,
        event_name: String,
        message: String,
    },

    #[error("Network problem while {step} for member {member_id} at {event_name}: {message}; please re-scan")]
    Transport {
        member_id: String,
        event_name: String,
        step: &'static str,
        message: String,
    },

    #[error("Check-in for member {member_id} at {event_name} is already in progress")]
    InFlight {
        member_id: String,
        event_name: String,
    },
}

impl CheckinError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckinError::NotFound { .. } => FailureKind::NotFound,
            CheckinError::AlreadyCheckedIn { .. } => FailureKind::AlreadyCheckedIn,
            CheckinError::CreateError { .. } => FailureKind::CreateError,
            CheckinError::Transport { .. } => FailureKind::TransportError,
            CheckinError::InFlight { .. } => FailureKind::InFlight,
        }
    }

    pub fn member_id(&self) -> &str {
        match self {
            CheckinError::NotFound { member_id }
            | CheckinError::AlreadyCheckedIn { member_id, .. }
            | CheckinError::CreateError { member_id, .. }
            | CheckinError::Transport { member_id, .. }
            | CheckinError::InFlight { member_id, .. } => member_id,
        }
    }
}

/// Pick the passport to stamp according to `policy`
pub fn select_passport(policy: PassportPolicy, passports: &[PassportRef]) -> Option<&PassportRef> {
    match policy {
        PassportPolicy::FirstReturned => passports.first(),
        PassportPolicy::LowestId => passports.iter().min_by_key(|p| p.id),
        // max_by_key keeps the last maximum, so iterate reversed to keep the first
        PassportPolicy::NewestIssued => passports.iter().rev().max_by_key(|p| p.issued_at),
        PassportPolicy::ActiveFirst => passports
            .iter()
            .find(|p| p.is_active())
            .or_else(|| passports.first()),
    }
}

type InFlightKey = (String, i64);

/// Removes the (member, event) marker when the run ends, however it ends
struct InFlightGuard {
    set: Arc<Mutex<HashSet<InFlightKey>>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // a poisoned set must still release the marker or the member stays locked out
        let mut set = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.key);
    }
}

/// Sequences passport lookup, duplicate detection and stamp creation
pub struct CheckinOrchestrator {
    api: Arc<dyn StampApi>,
    event_bus: EventBus,
    settings: OrchestratorSettings,
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl CheckinOrchestrator {
    pub fn new(api: Arc<dyn StampApi>, event_bus: EventBus, settings: OrchestratorSettings) -> Self {
        Self {
            api,
            event_bus,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Whether a run for (member, event) is currently in flight
    pub fn is_in_flight(&self, member_id: &str, event_id: i64) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(member_id.to_string(), event_id))
    }

    /// Run one check-in to completion or a terminal failure
    pub async fn check_in(
        &self,
        member: &MemberReference,
        ctx: &OrchestrationContext,
    ) -> Result<StampRecord, CheckinError> {
        let _guard = match self.claim(member, ctx) {
            Some(guard) => guard,
            None => {
                let err = CheckinError::InFlight {
                    member_id: member.member_id.clone(),
                    event_name: ctx.event.name.clone(),
                };
                info!(
                    member_id = %member.member_id,
                    event_id = ctx.event.id,
                    "Ignoring scan: check-in already in progress"
                );
                self.publish_failure(&err, ctx);
                return Err(err);
            }
        };

        let result = self.run_steps(member, ctx).await;

        match &result {
            Ok(stamp) => {
                self.transition(member, ctx, CheckinState::Done);
                info!(
                    member_id = %member.member_id,
                    event_id = ctx.event.id,
                    stamp_id = stamp.id,
                    passport_id = stamp.passport_id,
                    "Check-in recorded"
                );
                self.event_bus.emit_lossy(ScanEvent::CheckinSucceeded {
                    stamp: stamp.clone(),
                    member_name: member.display_name.clone(),
                    timestamp: stampify_common::time::now(),
                });
            }
            Err(err) => {
                self.transition(member, ctx, CheckinState::Failed);
                warn!(
                    member_id = %member.member_id,
                    event_id = ctx.event.id,
                    kind = ?err.kind(),
                    "Check-in failed: {}",
                    err
                );
                self.publish_failure(err, ctx);
            }
        }

        self.transition(member, ctx, CheckinState::Idle);
        result
    }

    fn claim(&self, member: &MemberReference, ctx: &OrchestrationContext) -> Option<InFlightGuard> {
        let key = (member.member_id.clone(), ctx.event.id);
        let mut set = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }

    async fn run_steps(
        &self,
        member: &MemberReference,
        ctx: &OrchestrationContext,
    ) -> Result<StampRecord, CheckinError> {
        // RESOLVING_PASSPORT
        self.transition(member, ctx, CheckinState::ResolvingPassport);
        let passports = self
            .bounded(
                member,
                ctx,
                "looking up the passport",
                self.api.passports_for_member(&member.member_id),
            )
            .await?;

        let passport = select_passport(self.settings.passport_policy, &passports)
            .ok_or_else(|| CheckinError::NotFound {
                member_id: member.member_id.clone(),
            })?
            .clone();
        if passports.len() > 1 {
            info!(
                member_id = %member.member_id,
                candidates = passports.len(),
                chosen = passport.id,
                policy = ?self.settings.passport_policy,
                "Member has several passports"
            );
        }

        // CHECKING_DUPLICATE
        if self.settings.duplicate_check == DuplicateCheck::PreCheck {
            self.transition(member, ctx, CheckinState::CheckingDuplicate);
            let existing = self
                .bounded(
                    member,
                    ctx,
                    "checking for an existing stamp",
                    self.api.stamps_for_passport_event(passport.id, ctx.event.id),
                )
                .await?;
            if existing.iter().any(StampRecord::counts_as_attendance) {
                return Err(self.already_checked_in(member, ctx));
            }
        }

        // CREATING_STAMP
        self.transition(member, ctx, CheckinState::CreatingStamp);
        let request = NewStamp {
            passport_id: passport.id,
            event_id: ctx.event.id,
            scanner_id: ctx.scanner_id,
            scan_status: ScanStatus::Success,
        };

        let created = tokio::time::timeout(self.settings.step_timeout, self.api.create_stamp(&request))
            .await
            .map_err(|_| self.timeout_error(member, ctx, "recording the check-in"))?;

        match created {
            Ok(stamp) => Ok(self.complete_record(stamp, member, ctx)),
            Err(ClientError::Status { status, message }) => {
                if status == 409 || is_duplicate_message(&message) {
                    Err(self.already_checked_in(member, ctx))
                } else {
                    Err(CheckinError::CreateError {
                        member_id: member.member_id.clone(),
                        event_name: ctx.event.name.clone(),
                        message,
                    })
                }
            }
            Err(ClientError::Decode(message)) => Err(CheckinError::CreateError {
                member_id: member.member_id.clone(),
                event_name: ctx.event.name.clone(),
                message: format!(
                    "server answered with an unreadable response ({}); refresh the history before re-scanning",
                    message
                ),
            }),
            Err(ClientError::Network(message)) => Err(CheckinError::Transport {
                member_id: member.member_id.clone(),
                event_name: ctx.event.name.clone(),
                step: "recording the check-in",
                message,
            }),
        }
    }

    /// Await a lookup step under the step timeout; any failure is a transport failure
    async fn bounded<T, F>(
        &self,
        member: &MemberReference,
        ctx: &OrchestrationContext,
        step: &'static str,
        fut: F,
    ) -> Result<T, CheckinError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.settings.step_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CheckinError::Transport {
                member_id: member.member_id.clone(),
                event_name: ctx.event.name.clone(),
                step,
                message: e.to_string(),
            }),
            Err(_) => Err(self.timeout_error(member, ctx, step)),
        }
    }

    fn timeout_error(
        &self,
        member: &MemberReference,
        ctx: &OrchestrationContext,
        step: &'static str,
    ) -> CheckinError {
        CheckinError::Transport {
            member_id: member.member_id.clone(),
            event_name: ctx.event.name.clone(),
            step,
            message: format!(
                "no response within {} ms",
                self.settings.step_timeout.as_millis()
            ),
        }
    }

    fn already_checked_in(&self, member: &MemberReference, ctx: &OrchestrationContext) -> CheckinError {
        CheckinError::AlreadyCheckedIn {
            member_id: member.member_id.clone(),
            member_name: member.display_name.clone(),
            event_name: ctx.event.name.clone(),
        }
    }

    /// Fill display fields the server left out of the created stamp
    fn complete_record(
        &self,
        mut stamp: StampRecord,
        member: &MemberReference,
        ctx: &OrchestrationContext,
    ) -> StampRecord {
        stamp.member_id.get_or_insert_with(|| member.member_id.clone());
        stamp.member_name.get_or_insert_with(|| member.display_name.clone());
        stamp.event_name.get_or_insert_with(|| ctx.event.name.clone());
        stamp.scanner_id.get_or_insert(ctx.scanner_id);
        stamp.stamped_at.get_or_insert_with(stampify_common::time::now);
        stamp
    }

    fn transition(&self, member: &MemberReference, ctx: &OrchestrationContext, state: CheckinState) {
        self.event_bus.emit_lossy(ScanEvent::CheckinStateChanged {
            member_id: member.member_id.clone(),
            event_id: ctx.event.id,
            state,
            timestamp: stampify_common::time::now(),
        });
    }

    fn publish_failure(&self, err: &CheckinError, ctx: &OrchestrationContext) {
        self.event_bus.emit_lossy(ScanEvent::CheckinFailed {
            member_id: Some(err.member_id().to_string()),
            event_id: Some(ctx.event.id),
            kind: err.kind(),
            message: err.to_string(),
            timestamp: stampify_common::time::now(),
        });
    }
}

fn is_duplicate_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    DUPLICATE_MARKERS.iter().any(|m| lower.contains(m))
}
