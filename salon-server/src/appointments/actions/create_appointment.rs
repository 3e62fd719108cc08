//! CreateAppointment command handler
//!
//! Books a contiguous block of hourly slots on a chair. The manager
//! resolves the chair, its working hours for the requested weekday and the
//! selected offerings from the catalog before constructing the action, so
//! execution only reads booking state through the context.

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::info;
use uuid::Uuid;

use crate::appointments::reducer;
use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use crate::pricing;
use crate::scheduling::grid;
use crate::utils::time;
use shared::appointment::{
    AppointmentEvent, AppointmentEventType, EventPayload, RequesterRole, Responsibility,
};
use shared::models::{Chair, PricingMode, ServiceOffering, WorkingHours};

/// CreateAppointment action
///
/// `hours` is the canonical working-hour record for the requested weekday;
/// `None` means the chair is closed that day. `now_millis` is the server
/// clock at command arrival, injected so expiry and past-slot checks are
/// deterministic.
#[derive(Debug, Clone)]
pub struct CreateAppointmentAction {
    pub chair: Chair,
    pub hours: Option<WorkingHours>,
    pub offerings: Vec<ServiceOffering>,
    pub customer_id: String,
    pub customer_name: String,
    pub requester_role: RequesterRole,
    /// "YYYY-MM-DD"
    pub date: String,
    /// "HH:mm", start of the first requested slot
    pub start_time: String,
    pub slot_count: u32,
    /// How long both parties have to answer before the request expires
    pub pending_ttl_millis: i64,
    pub tz: Tz,
    pub now_millis: i64,
}

#[async_trait]
impl CommandHandler for CreateAppointmentAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        info!(
            chair_id = %self.chair.id,
            date = %self.date,
            start_time = %self.start_time,
            slot_count = self.slot_count,
            "CreateAppointmentAction::execute starting"
        );

        // 1. Validate the requested block shape
        if self.slot_count == 0 {
            return Err(AppointmentError::Validation(
                "slot_count must be at least 1".to_string(),
            ));
        }
        let date = time::parse_date(&self.date)?;
        let start = time::parse_hhmm(&self.start_time)?;

        // 2. The chair must be open that day
        let hours = match &self.hours {
            Some(h) if !h.is_closed => h,
            _ => {
                return Err(AppointmentError::SlotUnavailable(format!(
                    "Chair {} is closed on {}",
                    self.chair.id, self.date
                )));
            }
        };

        // 3. The block must sit on the hourly grid inside working hours
        let open = time::parse_hhmm(&hours.open_time)?;
        let close = time::parse_hhmm(&hours.close_time)?;
        let slots = grid::partition_slots(open, close)?;
        let start_idx = slots.iter().position(|(s, _)| *s == start).ok_or_else(|| {
            AppointmentError::SlotUnavailable(format!(
                "Start {} is not a bookable slot between {} and {}",
                self.start_time, hours.open_time, hours.close_time
            ))
        })?;
        let end_idx = start_idx + self.slot_count as usize;
        if end_idx > slots.len() {
            return Err(AppointmentError::SlotUnavailable(format!(
                "{} slots from {} run past closing time {}",
                self.slot_count, self.start_time, hours.close_time
            )));
        }
        let end = slots[end_idx - 1].1;
        let end_time = time::format_hhmm(end);

        // 4. Reject past blocks. A block whose first slot has not yet ended
        //    is still bookable, same is_past rule as the availability
        //    projection.
        let scheduled_start_at = time::date_time_to_millis(date, start, self.tz);
        let scheduled_end_at = time::date_time_to_millis(date, end, self.tz);
        let first_slot_end_at = scheduled_start_at + grid::SLOT_MINUTES * 60_000;
        if first_slot_end_at <= self.now_millis {
            return Err(AppointmentError::SlotUnavailable(format!(
                "Slot {} {} is in the past",
                self.date, self.start_time
            )));
        }

        // 5. Someone must be able to answer the request
        let responsibility = Responsibility {
            store: self.chair.store_responsible(),
            provider: self.chair.provider_responsible(),
        };
        if !responsibility.store && !responsibility.provider {
            return Err(AppointmentError::Validation(format!(
                "Chair {} has no store or provider to approve bookings",
                self.chair.id
            )));
        }

        // 6. Price the booking
        if self.chair.pricing_mode == PricingMode::Percent && self.offerings.is_empty() {
            return Err(AppointmentError::Validation(format!(
                "Chair {} uses PERCENT pricing; select at least one service",
                self.chair.id
            )));
        }
        let total_price = pricing::compute_total(
            self.chair.pricing_mode,
            self.chair.pricing_value,
            self.slot_count,
            &self.offerings,
        );

        // 7. Check overlap against bookings that still hold their slots
        let existing = ctx.day_bookings(&self.chair.id, &self.date)?;
        for booked in existing
            .iter()
            .filter(|b| reducer::blocks_slots_at(b, self.now_millis))
        {
            if booked.scheduled_start_at < scheduled_end_at
                && scheduled_start_at < booked.scheduled_end_at
            {
                return Err(AppointmentError::SlotUnavailable(format!(
                    "Block {}-{} overlaps appointment {}",
                    self.start_time, end_time, booked.appointment_id
                )));
            }
        }

        // 8. Emit the creation event
        let appointment_id = Uuid::new_v4().to_string();
        let seq = ctx.next_sequence();
        let event = AppointmentEvent::new(
            seq,
            appointment_id.clone(),
            metadata.operator_id.clone(),
            metadata.operator_name.clone(),
            metadata.command_id.clone(),
            Some(metadata.timestamp),
            AppointmentEventType::AppointmentCreated,
            EventPayload::AppointmentCreated {
                customer_id: self.customer_id.clone(),
                customer_name: self.customer_name.clone(),
                chair_id: Some(self.chair.id.clone()),
                chair_name: Some(self.chair.name.clone()),
                provider_id: self.chair.provider_id.clone(),
                store_id: self.chair.store_id.clone(),
                requester_role: self.requester_role,
                date: self.date.clone(),
                start_time: self.start_time.clone(),
                end_time,
                scheduled_start_at,
                scheduled_end_at,
                slot_count: self.slot_count,
                offering_ids: self.offerings.iter().map(|o| o.id.clone()).collect(),
                total_price,
                pending_expires_at: self.now_millis + self.pending_ttl_millis,
                responsibility,
            },
        );

        info!(
            appointment_id = %appointment_id,
            seq,
            total_price,
            "CreateAppointmentAction::execute completed"
        );
        Ok(vec![event])
    }
}
