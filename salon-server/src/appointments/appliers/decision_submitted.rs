//! DecisionSubmitted event applier
//!
//! Records one party's decision and applies the composite status the
//! action computed when the event was generated. The applier never runs
//! the reducer itself: replay must reproduce exactly what was decided,
//! not re-derive it against a different clock.

use crate::appointments::traits::EventApplier;
use shared::appointment::{
    AppointmentEvent, AppointmentSnapshot, AppointmentStatus, DecisionParty, EventPayload,
};

/// DecisionSubmitted applier
pub struct DecisionSubmittedApplier;

impl EventApplier for DecisionSubmittedApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        if let EventPayload::DecisionSubmitted {
            party,
            decision,
            resulting_status,
        } = &event.payload
        {
            match party {
                DecisionParty::Store => snapshot.store_decision = *decision,
                DecisionParty::Provider => snapshot.provider_decision = *decision,
            }

            snapshot.status = *resulting_status;
            if *resulting_status == AppointmentStatus::Approved && snapshot.approved_at.is_none() {
                snapshot.approved_at = Some(event.timestamp);
            }

            snapshot.last_sequence = event.sequence;
            snapshot.updated_at = event.timestamp;
        }
    }
}
