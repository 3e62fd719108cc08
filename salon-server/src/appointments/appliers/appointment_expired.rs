//! AppointmentExpired event applier
//!
//! Converts a lapsed Pending appointment to Unanswered. Responsible
//! parties that never responded are marked NoAnswer; a decision that was
//! recorded (e.g. one approval) stays as recorded for the audit trail.

use crate::appointments::traits::EventApplier;
use shared::appointment::{
    AppointmentEvent, AppointmentSnapshot, AppointmentStatus, EventPayload, PartyDecision,
};

/// AppointmentExpired applier
pub struct AppointmentExpiredApplier;

impl EventApplier for AppointmentExpiredApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        if let EventPayload::AppointmentExpired {} = &event.payload {
            snapshot.status = AppointmentStatus::Unanswered;

            if snapshot.responsibility.store && snapshot.store_decision == PartyDecision::Pending {
                snapshot.store_decision = PartyDecision::NoAnswer;
            }
            if snapshot.responsibility.provider
                && snapshot.provider_decision == PartyDecision::Pending
            {
                snapshot.provider_decision = PartyDecision::NoAnswer;
            }

            snapshot.last_sequence = event.sequence;
            snapshot.updated_at = event.timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::appointment::{AppointmentEventType, Responsibility};

    fn create_expired_event(appointment_id: &str, seq: u64) -> AppointmentEvent {
        AppointmentEvent::new(
            seq,
            appointment_id.to_string(),
            "system".to_string(),
            "System".to_string(),
            "cmd-sweep-1".to_string(),
            None,
            AppointmentEventType::AppointmentExpired,
            EventPayload::AppointmentExpired {},
        )
    }

    #[test]
    fn test_expired_marks_unanswered() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        snapshot.responsibility = Responsibility {
            store: true,
            provider: true,
        };

        let event = create_expired_event("appt-1", 3);
        AppointmentExpiredApplier.apply(&mut snapshot, &event);

        assert_eq!(snapshot.status, AppointmentStatus::Unanswered);
        assert_eq!(snapshot.store_decision, PartyDecision::NoAnswer);
        assert_eq!(snapshot.provider_decision, PartyDecision::NoAnswer);
    }

    #[test]
    fn test_expired_preserves_recorded_decision() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        snapshot.responsibility = Responsibility {
            store: true,
            provider: true,
        };
        snapshot.store_decision = PartyDecision::Approved;

        let event = create_expired_event("appt-1", 3);
        AppointmentExpiredApplier.apply(&mut snapshot, &event);

        assert_eq!(snapshot.status, AppointmentStatus::Unanswered);
        assert_eq!(snapshot.store_decision, PartyDecision::Approved);
        assert_eq!(snapshot.provider_decision, PartyDecision::NoAnswer);
    }

    #[test]
    fn test_expired_skips_non_responsible_party() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        snapshot.responsibility = Responsibility {
            store: true,
            provider: false,
        };

        let event = create_expired_event("appt-1", 3);
        AppointmentExpiredApplier.apply(&mut snapshot, &event);

        assert_eq!(snapshot.store_decision, PartyDecision::NoAnswer);
        // Never asked, so never marked NoAnswer
        assert_eq!(snapshot.provider_decision, PartyDecision::Pending);
    }
}
