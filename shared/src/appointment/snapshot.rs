//! Appointment snapshot - computed state from event stream
//!
//! The composite `status` is never written independently: it is always the
//! output of the decision reducer over the two party decisions, the expiry
//! deadline, and the evaluation instant. The snapshot stores the value the
//! last applied event produced; readers re-derive when freshness matters.

use serde::{Deserialize, Serialize};

/// Composite appointment status
///
/// `Completed`, `Cancelled`, `Rejected` and `Unanswered` are terminal: once
/// reached, no further decision, completion or cancellation is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Cancelled,
    Rejected,
    Unanswered,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rejected
                | AppointmentStatus::Unanswered
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::Approved => write!(f, "APPROVED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
            AppointmentStatus::Rejected => write!(f, "REJECTED"),
            AppointmentStatus::Unanswered => write!(f, "UNANSWERED"),
        }
    }
}

/// One party's decision on a pending appointment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyDecision {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// Never answered before the pending deadline passed
    NoAnswer,
}

/// Which side of the appointment a decision belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionParty {
    Store,
    Provider,
}

impl std::fmt::Display for DecisionParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionParty::Store => write!(f, "STORE"),
            DecisionParty::Provider => write!(f, "PROVIDER"),
        }
    }
}

/// Role of the actor that requested the appointment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterRole {
    #[default]
    Customer,
    Store,
    Provider,
}

/// Which parties must answer before an appointment can be approved
///
/// Fixed at creation from the chair's ownership: a store-owned chair with no
/// resident provider is store-only; a provider-owned chair with no store is
/// provider-only; a chair with both requires both approvals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Responsibility {
    pub store: bool,
    pub provider: bool,
}

impl Default for Responsibility {
    fn default() -> Self {
        Self {
            store: true,
            provider: true,
        }
    }
}

/// Appointment snapshot - computed from event stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSnapshot {
    /// Appointment ID (assigned by server)
    pub appointment_id: String,
    /// Requesting customer
    pub customer_id: String,
    pub customer_name: String,
    /// Assigned chair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chair_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chair_name: Option<String>,
    /// Assigned provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Owning store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    /// Who created the request
    #[serde(default)]
    pub requester_role: RequesterRole,
    /// Calendar day, "YYYY-MM-DD"
    pub date: String,
    /// "HH:mm", first selected slot
    pub start_time: String,
    /// "HH:mm", end of last selected slot
    pub end_time: String,
    /// Absolute scheduled bounds, Unix milliseconds (server timezone)
    pub scheduled_start_at: i64,
    pub scheduled_end_at: i64,
    /// Number of contiguous hourly slots
    pub slot_count: u32,
    /// Selected service offerings
    #[serde(default)]
    pub offering_ids: Vec<String>,
    /// Computed booking total
    pub total_price: f64,
    /// Composite status - always reducer output, never set directly
    pub status: AppointmentStatus,
    pub store_decision: PartyDecision,
    pub provider_decision: PartyDecision,
    /// Parties whose approval is required
    #[serde(default)]
    pub responsibility: Responsibility,
    /// Deadline after which an unanswered request auto-resolves
    pub pending_expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    /// User that cancelled, when status is Cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    /// Creation timestamp
    pub created_at: i64,
    /// Last update timestamp
    pub updated_at: i64,
    /// Last applied event sequence (for incremental updates)
    pub last_sequence: u64,
}

impl AppointmentSnapshot {
    /// Create a new empty appointment in Pending
    pub fn new(appointment_id: String) -> Self {
        let now = crate::util::now_millis();
        Self {
            appointment_id,
            customer_id: String::new(),
            customer_name: String::new(),
            chair_id: None,
            chair_name: None,
            provider_id: None,
            store_id: None,
            requester_role: RequesterRole::default(),
            date: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            scheduled_start_at: 0,
            scheduled_end_at: 0,
            slot_count: 0,
            offering_ids: Vec::new(),
            total_price: 0.0,
            status: AppointmentStatus::Pending,
            store_decision: PartyDecision::Pending,
            provider_decision: PartyDecision::Pending,
            responsibility: Responsibility::default(),
            pending_expires_at: 0,
            approved_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            last_sequence: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_approved(&self) -> bool {
        self.status == AppointmentStatus::Approved
    }

    /// Whether this appointment still blocks its slots on the calendar
    pub fn blocks_slots(&self) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Pending | AppointmentStatus::Approved | AppointmentStatus::Completed
        )
    }

    /// The decision recorded for one party
    pub fn decision_of(&self, party: DecisionParty) -> PartyDecision {
        match party {
            DecisionParty::Store => self.store_decision,
            DecisionParty::Provider => self.provider_decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_snapshot_starts_pending() {
        let snapshot = AppointmentSnapshot::new("appt-1".to_string());
        assert_eq!(snapshot.status, AppointmentStatus::Pending);
        assert_eq!(snapshot.store_decision, PartyDecision::Pending);
        assert_eq!(snapshot.provider_decision, PartyDecision::Pending);
        assert!(!snapshot.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Rejected,
            AppointmentStatus::Unanswered,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Approved.is_terminal());
    }

    #[test]
    fn test_blocks_slots() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        assert!(snapshot.blocks_slots());
        snapshot.status = AppointmentStatus::Rejected;
        assert!(!snapshot.blocks_slots());
        snapshot.status = AppointmentStatus::Cancelled;
        assert!(!snapshot.blocks_slots());
        snapshot.status = AppointmentStatus::Completed;
        assert!(snapshot.blocks_slots());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&AppointmentStatus::Unanswered).unwrap();
        assert_eq!(json, "\"UNANSWERED\"");
        let json = serde_json::to_string(&PartyDecision::NoAnswer).unwrap();
        assert_eq!(json, "\"NO_ANSWER\"");
        let back: AppointmentStatus = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(back, AppointmentStatus::Approved);
    }
}
