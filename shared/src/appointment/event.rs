//! Appointment events - immutable facts recorded after command processing

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::{
    AppointmentStatus, DecisionParty, PartyDecision, RequesterRole, Responsibility,
};

/// Appointment event - immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    /// Event unique ID
    pub event_id: String,
    /// Global sequence number (for ordering and replay)
    /// This is the AUTHORITATIVE ordering mechanism for state evolution
    pub sequence: u64,
    /// Appointment this event belongs to
    pub appointment_id: String,
    /// Server timestamp (Unix milliseconds) - AUTHORITATIVE for state evolution
    pub timestamp: i64,
    /// Client timestamp (Unix milliseconds) - for audit and debugging
    /// Preserved from the original command, may differ due to clock skew
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<i64>,
    /// Operator who triggered this event
    pub operator_id: String,
    /// Operator name (snapshot for audit)
    pub operator_name: String,
    /// Command that triggered this event (for audit tracing)
    pub command_id: String,
    /// Event type
    pub event_type: AppointmentEventType,
    /// Event payload
    pub payload: EventPayload,
}

impl AppointmentEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        appointment_id: String,
        operator_id: String,
        operator_name: String,
        command_id: String,
        client_timestamp: Option<i64>,
        event_type: AppointmentEventType,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            sequence,
            appointment_id,
            timestamp: crate::util::now_millis(),
            client_timestamp,
            operator_id,
            operator_name,
            command_id,
            event_type,
            payload,
        }
    }
}

/// Event type enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentEventType {
    AppointmentCreated,
    DecisionSubmitted,
    AppointmentCompleted,
    AppointmentCancelled,
    AppointmentExpired,
}

impl std::fmt::Display for AppointmentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentEventType::AppointmentCreated => write!(f, "APPOINTMENT_CREATED"),
            AppointmentEventType::DecisionSubmitted => write!(f, "DECISION_SUBMITTED"),
            AppointmentEventType::AppointmentCompleted => write!(f, "APPOINTMENT_COMPLETED"),
            AppointmentEventType::AppointmentCancelled => write!(f, "APPOINTMENT_CANCELLED"),
            AppointmentEventType::AppointmentExpired => write!(f, "APPOINTMENT_EXPIRED"),
        }
    }
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ========== Lifecycle ==========
    AppointmentCreated {
        customer_id: String,
        customer_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chair_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chair_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        store_id: Option<String>,
        requester_role: RequesterRole,
        /// "YYYY-MM-DD"
        date: String,
        /// "HH:mm"
        start_time: String,
        /// "HH:mm", start of last slot + 60 minutes
        end_time: String,
        scheduled_start_at: i64,
        scheduled_end_at: i64,
        slot_count: u32,
        offering_ids: Vec<String>,
        /// Server-computed booking total
        total_price: f64,
        /// Creation time + pending TTL
        pending_expires_at: i64,
        responsibility: Responsibility,
    },

    // ========== Decisions ==========
    DecisionSubmitted {
        party: DecisionParty,
        decision: PartyDecision,
        /// Composite status the reducer produced from the decision pair
        /// at the event's server timestamp
        resulting_status: AppointmentStatus,
    },

    AppointmentCompleted {},

    AppointmentCancelled {
        /// User that cancelled
        cancelled_by: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// 等待超时：双方未在截止时间前全部确认
    AppointmentExpired {},
}
