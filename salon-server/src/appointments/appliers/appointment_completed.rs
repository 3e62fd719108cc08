//! AppointmentCompleted event applier

use crate::appointments::traits::EventApplier;
use shared::appointment::{AppointmentEvent, AppointmentSnapshot, AppointmentStatus, EventPayload};

/// AppointmentCompleted applier
pub struct AppointmentCompletedApplier;

impl EventApplier for AppointmentCompletedApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        if let EventPayload::AppointmentCompleted {} = &event.payload {
            snapshot.status = AppointmentStatus::Completed;
            snapshot.completed_at = Some(event.timestamp);

            snapshot.last_sequence = event.sequence;
            snapshot.updated_at = event.timestamp;
        }
    }
}
