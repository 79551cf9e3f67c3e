//! Operator session
//!
//! Who is scanning and for which event. Each check-in takes a snapshot
//! (`OrchestrationContext`) so a concurrent event switch never changes the
//! event a running check-in stamps.

use crate::orchestrator::OrchestrationContext;
use serde::Serialize;
use stampify_common::models::{EventContext, Operator};

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub operator: Operator,
    pub active_event: Option<EventContext>,
}

impl Session {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            active_event: None,
        }
    }

    /// Context for one check-in, if an event is selected
    pub fn context(&self) -> Option<OrchestrationContext> {
        self.active_event.as_ref().map(|event| OrchestrationContext {
            scanner_id: self.operator.id,
            event: event.clone(),
        })
    }

    pub fn can_check_in(&self) -> bool {
        self.operator.role.can_check_in()
    }
}
