//! AppointmentCancelled event applier

use crate::appointments::traits::EventApplier;
use shared::appointment::{AppointmentEvent, AppointmentSnapshot, AppointmentStatus, EventPayload};

/// AppointmentCancelled applier
pub struct AppointmentCancelledApplier;

impl EventApplier for AppointmentCancelledApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        if let EventPayload::AppointmentCancelled { cancelled_by, .. } = &event.payload {
            snapshot.status = AppointmentStatus::Cancelled;
            snapshot.cancelled_at = Some(event.timestamp);
            snapshot.cancelled_by = Some(cancelled_by.clone());

            snapshot.last_sequence = event.sequence;
            snapshot.updated_at = event.timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::appointment::AppointmentEventType;

    fn create_cancelled_event(
        appointment_id: &str,
        seq: u64,
        cancelled_by: &str,
    ) -> AppointmentEvent {
        AppointmentEvent::new(
            seq,
            appointment_id.to_string(),
            cancelled_by.to_string(),
            "Ana".to_string(),
            "cmd-1".to_string(),
            Some(1234567890),
            AppointmentEventType::AppointmentCancelled,
            EventPayload::AppointmentCancelled {
                cancelled_by: cancelled_by.to_string(),
                reason: Some("schedule conflict".to_string()),
            },
        )
    }

    #[test]
    fn test_cancelled_records_cancelling_party() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        snapshot.status = AppointmentStatus::Approved;

        let event = create_cancelled_event("appt-1", 5, "cust-1");
        AppointmentCancelledApplier.apply(&mut snapshot, &event);

        assert_eq!(snapshot.status, AppointmentStatus::Cancelled);
        assert_eq!(snapshot.cancelled_by.as_deref(), Some("cust-1"));
        assert_eq!(snapshot.cancelled_at, Some(event.timestamp));
        assert_eq!(snapshot.last_sequence, 5);
    }

    #[test]
    fn test_cancelled_from_pending() {
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());

        let event = create_cancelled_event("appt-1", 2, "store-1");
        AppointmentCancelledApplier.apply(&mut snapshot, &event);

        assert_eq!(snapshot.status, AppointmentStatus::Cancelled);
        assert_eq!(snapshot.cancelled_by.as_deref(), Some("store-1"));
    }
}
