//! CancelAppointment command handler
//!
//! 取消预约：客户本人或任一审批方可在终态之前取消。
//! The cancelling party's id is recorded on the event for audit.

use async_trait::async_trait;
use tracing::info;

use crate::appointments::reducer;
use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use shared::appointment::{AppointmentEvent, AppointmentEventType, EventPayload};

/// CancelAppointment action
#[derive(Debug, Clone)]
pub struct CancelAppointmentAction {
    pub appointment_id: String,
    pub cancelling_user_id: String,
    pub reason: Option<String>,
    /// Server clock at command arrival
    pub now_millis: i64,
}

#[async_trait]
impl CommandHandler for CancelAppointmentAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        info!(
            appointment_id = %self.appointment_id,
            cancelling_user_id = %self.cancelling_user_id,
            "CancelAppointmentAction::execute starting"
        );

        // 1. Load current state
        let snapshot = ctx.load_snapshot(&self.appointment_id)?;

        // 2. Terminal appointments cannot be cancelled; this also covers
        //    Completed and a lapsed Pending the sweep has not written yet
        let effective = reducer::effective_status(&snapshot, self.now_millis);
        if effective.is_terminal() {
            return Err(AppointmentError::AlreadyFinalized(
                self.appointment_id.clone(),
                effective,
            ));
        }

        // 3. Only the customer or a responsible party may cancel
        let allowed = self.cancelling_user_id == snapshot.customer_id
            || (snapshot.responsibility.store
                && snapshot.store_id.as_deref() == Some(self.cancelling_user_id.as_str()))
            || (snapshot.responsibility.provider
                && snapshot.provider_id.as_deref() == Some(self.cancelling_user_id.as_str()));
        if !allowed {
            return Err(AppointmentError::NotAuthorizedParty(format!(
                "User {} cannot cancel appointment {}",
                self.cancelling_user_id, self.appointment_id
            )));
        }

        // 4. Emit the cancellation event
        let seq = ctx.next_sequence();
        let event = AppointmentEvent::new(
            seq,
            self.appointment_id.clone(),
            metadata.operator_id.clone(),
            metadata.operator_name.clone(),
            metadata.command_id.clone(),
            Some(metadata.timestamp),
            AppointmentEventType::AppointmentCancelled,
            EventPayload::AppointmentCancelled {
                cancelled_by: self.cancelling_user_id.clone(),
                reason: self.reason.clone(),
            },
        );

        info!(
            appointment_id = %self.appointment_id,
            seq,
            "CancelAppointmentAction::execute completed"
        );
        Ok(vec![event])
    }
}
