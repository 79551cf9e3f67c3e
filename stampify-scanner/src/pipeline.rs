//! Scan pipeline: decoded text → member → check-in → history
//!
//! Glue between the decoder output, the payload parser, the orchestrator and
//! the history cache. Every rejection is published on the event bus once, so
//! operator views only need to follow the event stream.

use crate::decoder::{decode_image, CodeDecoder, DecodeError, DecodedCode};
use crate::history::SharedHistory;
use crate::live::CodeHandler;
use crate::orchestrator::{CheckinError, CheckinOrchestrator};
use crate::payload::{ParseError, PayloadParser};
use crate::session::Session;
use async_trait::async_trait;
use serde::Serialize;
use stampify_common::events::{EventBus, FailureKind, ScanEvent};
use stampify_common::models::{MemberReference, Role, ScanPayload, StampRecord};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Successful scan
#[derive(Debug, Clone, Serialize)]
pub struct CheckinReceipt {
    pub member: MemberReference,
    pub stamp: StampRecord,
}

/// Why a scan produced no stamp
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No QR code detected in the image")]
    NoCodeDetected,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("No event selected; choose the current event before scanning")]
    NoActiveEvent,

    #[error("Operator role {0:?} is not allowed to check members in")]
    Forbidden(Role),

    #[error(transparent)]
    Checkin(#[from] CheckinError),
}

pub struct ScanPipeline {
    parser: PayloadParser,
    orchestrator: CheckinOrchestrator,
    session: Arc<RwLock<Session>>,
    history: SharedHistory,
    event_bus: EventBus,
}

impl ScanPipeline {
    pub fn new(
        parser: PayloadParser,
        orchestrator: CheckinOrchestrator,
        session: Arc<RwLock<Session>>,
        history: SharedHistory,
        event_bus: EventBus,
    ) -> Self {
        Self {
            parser,
            orchestrator,
            session,
            history,
            event_bus,
        }
    }

    pub fn orchestrator(&self) -> &CheckinOrchestrator {
        &self.orchestrator
    }

    /// Check in the member encoded in `text`
    pub async fn submit_text(&self, text: &str) -> Result<CheckinReceipt, ScanError> {
        let payload = ScanPayload::new(text);

        let ctx = {
            let session = self.session.read().await;
            if !session.can_check_in() {
                return Err(ScanError::Forbidden(session.operator.role));
            }
            session.context().ok_or(ScanError::NoActiveEvent)?
        };

        let member = match self.parser.parse(&payload) {
            Ok(member) => member,
            Err(e) => {
                info!(event_id = ctx.event.id, "Rejected scan payload: {}", e);
                self.publish_rejection(FailureKind::ParseError, e.to_string(), Some(ctx.event.id));
                return Err(e.into());
            }
        };
        debug!(member_id = %member.member_id, decoded_at = %payload.decoded_at, "Payload parsed");

        // orchestrator publishes its own outcome events
        let stamp = self.orchestrator.check_in(&member, &ctx).await?;

        let inserted = self.history.write().await.prepend(stamp.clone());
        if !inserted {
            debug!(stamp_id = stamp.id, "Stamp already present in history");
        }

        Ok(CheckinReceipt { member, stamp })
    }

    /// Upload mode: decode one image and check in the member it shows
    ///
    /// Image decoding runs on the blocking pool.
    pub async fn submit_image(
        &self,
        decoder: Arc<dyn CodeDecoder>,
        bytes: Vec<u8>,
    ) -> Result<CheckinReceipt, ScanError> {
        let decoded = tokio::task::spawn_blocking(move || decode_image(decoder.as_ref(), &bytes))
            .await
            .map_err(|e| DecodeError::Worker(e.to_string()))?;
        let code = match decoded {
            Ok(Some(code)) => code,
            Ok(None) => {
                self.publish_rejection(
                    FailureKind::NoCodeDetected,
                    ScanError::NoCodeDetected.to_string(),
                    None,
                );
                return Err(ScanError::NoCodeDetected);
            }
            Err(e) => return Err(e.into()),
        };
        self.submit_text(&code.text).await
    }

    fn publish_rejection(&self, kind: FailureKind, message: String, event_id: Option<i64>) {
        self.event_bus.emit_lossy(ScanEvent::CheckinFailed {
            member_id: None,
            event_id,
            kind,
            message,
            timestamp: stampify_common::time::now(),
        });
    }
}

#[async_trait]
impl CodeHandler for ScanPipeline {
    async fn on_code(&self, code: DecodedCode) {
        match self.submit_text(&code.text).await {
            Ok(receipt) => info!(
                member_id = %receipt.member.member_id,
                stamp_id = receipt.stamp.id,
                "Live scan checked in"
            ),
            Err(e) => warn!("Live scan not checked in: {}", e),
        }
    }
}
