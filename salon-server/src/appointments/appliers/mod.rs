//! Event applier implementations
//!
//! Each applier implements the `EventApplier` trait and handles
//! one specific event type. Appliers are PURE functions.

use crate::appointments::traits::EventApplier;
use shared::appointment::{AppointmentEvent, AppointmentSnapshot, EventPayload};

mod appointment_cancelled;
mod appointment_completed;
mod appointment_created;
mod appointment_expired;
mod decision_submitted;

pub use appointment_cancelled::AppointmentCancelledApplier;
pub use appointment_completed::AppointmentCompletedApplier;
pub use appointment_created::AppointmentCreatedApplier;
pub use appointment_expired::AppointmentExpiredApplier;
pub use decision_submitted::DecisionSubmittedApplier;

/// EventAction enum - dispatches to concrete applier implementations
pub enum EventAction {
    AppointmentCreated(AppointmentCreatedApplier),
    DecisionSubmitted(DecisionSubmittedApplier),
    AppointmentCompleted(AppointmentCompletedApplier),
    AppointmentCancelled(AppointmentCancelledApplier),
    AppointmentExpired(AppointmentExpiredApplier),
}

impl EventApplier for EventAction {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        match self {
            EventAction::AppointmentCreated(applier) => applier.apply(snapshot, event),
            EventAction::DecisionSubmitted(applier) => applier.apply(snapshot, event),
            EventAction::AppointmentCompleted(applier) => applier.apply(snapshot, event),
            EventAction::AppointmentCancelled(applier) => applier.apply(snapshot, event),
            EventAction::AppointmentExpired(applier) => applier.apply(snapshot, event),
        }
    }
}

/// Convert AppointmentEvent reference to EventAction
///
/// This is the ONLY place with a match on EventPayload.
impl From<&AppointmentEvent> for EventAction {
    fn from(event: &AppointmentEvent) -> Self {
        match &event.payload {
            EventPayload::AppointmentCreated { .. } => {
                EventAction::AppointmentCreated(AppointmentCreatedApplier)
            }
            EventPayload::DecisionSubmitted { .. } => {
                EventAction::DecisionSubmitted(DecisionSubmittedApplier)
            }
            EventPayload::AppointmentCompleted { .. } => {
                EventAction::AppointmentCompleted(AppointmentCompletedApplier)
            }
            EventPayload::AppointmentCancelled { .. } => {
                EventAction::AppointmentCancelled(AppointmentCancelledApplier)
            }
            EventPayload::AppointmentExpired { .. } => {
                EventAction::AppointmentExpired(AppointmentExpiredApplier)
            }
        }
    }
}
