//! Appointment commands - client requests to mutate appointment state
//!
//! Commands are idempotent by `command_id`: the server records processed
//! ids and answers duplicates with a success response without re-executing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::{DecisionParty, PartyDecision, RequesterRole};

/// Command envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentCommand {
    /// Client-generated unique id, used for idempotency
    pub command_id: String,
    /// Acting user
    pub operator_id: String,
    /// Acting user display name (snapshot for audit)
    pub operator_name: String,
    /// Client timestamp, Unix milliseconds
    pub timestamp: i64,
    pub payload: AppointmentCommandPayload,
}

impl AppointmentCommand {
    pub fn new(
        operator_id: impl Into<String>,
        operator_name: impl Into<String>,
        payload: AppointmentCommandPayload,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            operator_id: operator_id.into(),
            operator_name: operator_name.into(),
            timestamp: crate::util::now_millis(),
            payload,
        }
    }
}

/// Command payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentCommandPayload {
    /// Book a contiguous block of slots on a chair
    ///
    /// The chair is the bookable resource; an independent provider is
    /// represented by a chair bound to that provider and no store.
    CreateAppointment {
        chair_id: String,
        customer_id: String,
        customer_name: String,
        requester_role: RequesterRole,
        /// "YYYY-MM-DD"
        date: String,
        /// "HH:mm", start of the first selected slot
        start_time: String,
        /// Number of contiguous hourly slots (end = start + count hours)
        slot_count: u32,
        #[serde(default)]
        offering_ids: Vec<String>,
    },

    /// Record one party's approve/reject decision
    SubmitDecision {
        appointment_id: String,
        party: DecisionParty,
        decision: PartyDecision,
    },

    /// Close out an approved appointment after its scheduled end
    CompleteAppointment { appointment_id: String },

    /// Cancel by customer or an approving party
    CancelAppointment {
        appointment_id: String,
        cancelling_user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}
