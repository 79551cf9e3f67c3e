//! Event types for the Stampify event system
//!
//! Check-in progress, outcomes and scanner lifecycle are broadcast on the
//! EventBus so that any connected operator view (SSE) can reconcile its state.

use crate::models::StampRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Position of one check-in run in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckinState {
    Idle,
    ResolvingPassport,
    CheckingDuplicate,
    CreatingStamp,
    Done,
    Failed,
}

impl CheckinState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CheckinState::Done | CheckinState::Failed)
    }
}

/// Why a scan did not produce a stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    ParseError,
    NotFound,
    AlreadyCheckedIn,
    CreateError,
    TransportError,
    InFlight,
    NoCodeDetected,
}

/// Stampify event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// A check-in run moved to a new state
    CheckinStateChanged {
        member_id: String,
        event_id: i64,
        state: CheckinState,
        timestamp: DateTime<Utc>,
    },

    /// A stamp was created for the scanned member
    CheckinSucceeded {
        stamp: StampRecord,
        member_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A scan was rejected or a check-in run failed
    ///
    /// `member_id` is absent when the payload never resolved to a member.
    CheckinFailed {
        member_id: Option<String>,
        event_id: Option<i64>,
        kind: FailureKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Live decoder located a code in the current frame
    ///
    /// Corners are pixel coordinates in frame space, for the overlay.
    CodeDetected {
        text: String,
        corners: [(i32, i32); 4],
        timestamp: DateTime<Utc>,
    },

    /// Live scanning began (camera acquired)
    ScannerStarted { timestamp: DateTime<Utc> },

    /// Live scanning stopped (camera released)
    ScannerStopped { timestamp: DateTime<Utc> },

    /// Scan history was rebuilt from the server
    HistoryRefreshed {
        event_id: i64,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Operator switched the active event
    ActiveEventChanged {
        event_id: i64,
        event_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::CheckinStateChanged { .. } => "CheckinStateChanged",
            ScanEvent::CheckinSucceeded { .. } => "CheckinSucceeded",
            ScanEvent::CheckinFailed { .. } => "CheckinFailed",
            ScanEvent::CodeDetected { .. } => "CodeDetected",
            ScanEvent::ScannerStarted { .. } => "ScannerStarted",
            ScanEvent::ScannerStopped { .. } => "ScannerStopped",
            ScanEvent::HistoryRefreshed { .. } => "HistoryRefreshed",
            ScanEvent::ActiveEventChanged { .. } => "ActiveEventChanged",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// observe `Lagged` instead of holding up check-ins.
///
/// ```
/// use stampify_common::events::{EventBus, ScanEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(ScanEvent::ScannerStarted { timestamp: chrono::Utc::now() });
/// assert_eq!(rx.try_recv().unwrap().event_type(), "ScannerStarted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ScanEvent) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
