//! CompleteAppointment command handler
//!
//! Closes out an approved appointment once its scheduled block is over.

use async_trait::async_trait;
use tracing::info;

use crate::appointments::reducer;
use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use shared::appointment::{
    AppointmentEvent, AppointmentEventType, AppointmentStatus, EventPayload,
};

/// CompleteAppointment action
#[derive(Debug, Clone)]
pub struct CompleteAppointmentAction {
    pub appointment_id: String,
    /// Server clock at command arrival
    pub now_millis: i64,
}

#[async_trait]
impl CommandHandler for CompleteAppointmentAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        info!(
            appointment_id = %self.appointment_id,
            "CompleteAppointmentAction::execute starting"
        );

        // 1. Load current state
        let snapshot = ctx.load_snapshot(&self.appointment_id)?;

        // 2. Terminal appointments stay as they are
        let effective = reducer::effective_status(&snapshot, self.now_millis);
        if effective.is_terminal() {
            return Err(AppointmentError::AlreadyFinalized(
                self.appointment_id.clone(),
                effective,
            ));
        }

        // 3. Only approved appointments can be completed
        if effective != AppointmentStatus::Approved {
            return Err(AppointmentError::InvalidTransition(format!(
                "Appointment {} is {}; only approved appointments can be completed",
                self.appointment_id, effective
            )));
        }

        // 4. The scheduled block must be over (end <= now, same convention
        //    as the slot projection's is_past)
        if self.now_millis < snapshot.scheduled_end_at {
            return Err(AppointmentError::InvalidTransition(format!(
                "Appointment {} runs until {}; it cannot be completed early",
                self.appointment_id, snapshot.end_time
            )));
        }

        // 5. Emit the completion event
        let seq = ctx.next_sequence();
        let event = AppointmentEvent::new(
            seq,
            self.appointment_id.clone(),
            metadata.operator_id.clone(),
            metadata.operator_name.clone(),
            metadata.command_id.clone(),
            Some(metadata.timestamp),
            AppointmentEventType::AppointmentCompleted,
            EventPayload::AppointmentCompleted {},
        );

        info!(
            appointment_id = %self.appointment_id,
            seq,
            "CompleteAppointmentAction::execute completed"
        );
        Ok(vec![event])
    }
}
