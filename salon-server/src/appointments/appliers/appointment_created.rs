//! AppointmentCreated event applier
//!
//! Fills a fresh snapshot from the creation payload. The appointment
//! starts Pending with both party decisions undecided.

use crate::appointments::traits::EventApplier;
use shared::appointment::{
    AppointmentEvent, AppointmentSnapshot, AppointmentStatus, EventPayload, PartyDecision,
};

/// AppointmentCreated applier
pub struct AppointmentCreatedApplier;

impl EventApplier for AppointmentCreatedApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent) {
        if let EventPayload::AppointmentCreated {
            customer_id,
            customer_name,
            chair_id,
            chair_name,
            provider_id,
            store_id,
            requester_role,
            date,
            start_time,
            end_time,
            scheduled_start_at,
            scheduled_end_at,
            slot_count,
            offering_ids,
            total_price,
            pending_expires_at,
            responsibility,
        } = &event.payload
        {
            snapshot.customer_id = customer_id.clone();
            snapshot.customer_name = customer_name.clone();
            snapshot.chair_id = chair_id.clone();
            snapshot.chair_name = chair_name.clone();
            snapshot.provider_id = provider_id.clone();
            snapshot.store_id = store_id.clone();
            snapshot.requester_role = *requester_role;
            snapshot.date = date.clone();
            snapshot.start_time = start_time.clone();
            snapshot.end_time = end_time.clone();
            snapshot.scheduled_start_at = *scheduled_start_at;
            snapshot.scheduled_end_at = *scheduled_end_at;
            snapshot.slot_count = *slot_count;
            snapshot.offering_ids = offering_ids.clone();
            snapshot.total_price = *total_price;
            snapshot.pending_expires_at = *pending_expires_at;
            snapshot.responsibility = *responsibility;

            snapshot.status = AppointmentStatus::Pending;
            snapshot.store_decision = PartyDecision::Pending;
            snapshot.provider_decision = PartyDecision::Pending;

            snapshot.created_at = event.timestamp;
            snapshot.updated_at = event.timestamp;
            snapshot.last_sequence = event.sequence;
        }
    }
}
