//! Command action implementations
//!
//! Each action implements the `CommandHandler` trait and handles
//! one specific command type.

use async_trait::async_trait;

use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use shared::appointment::{AppointmentCommand, AppointmentCommandPayload, AppointmentEvent};

mod cancel_appointment;
mod complete_appointment;
mod create_appointment;
mod expire_appointment;
mod submit_decision;

pub use cancel_appointment::CancelAppointmentAction;
pub use complete_appointment::CompleteAppointmentAction;
pub use create_appointment::CreateAppointmentAction;
pub use expire_appointment::ExpireAppointmentAction;
pub use submit_decision::SubmitDecisionAction;

/// CommandAction enum - dispatches to concrete action implementations
///
/// `ExpireAppointment` has no command payload: it is constructed by the
/// manager's expiry sweep, not by clients.
pub enum CommandAction {
    CreateAppointment(CreateAppointmentAction),
    SubmitDecision(SubmitDecisionAction),
    CompleteAppointment(CompleteAppointmentAction),
    CancelAppointment(CancelAppointmentAction),
    ExpireAppointment(ExpireAppointmentAction),
}

/// Manual implementation of CommandHandler for CommandAction
#[async_trait]
impl CommandHandler for CommandAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        match self {
            CommandAction::CreateAppointment(action) => action.execute(ctx, metadata).await,
            CommandAction::SubmitDecision(action) => action.execute(ctx, metadata).await,
            CommandAction::CompleteAppointment(action) => action.execute(ctx, metadata).await,
            CommandAction::CancelAppointment(action) => action.execute(ctx, metadata).await,
            CommandAction::ExpireAppointment(action) => action.execute(ctx, metadata).await,
        }
    }
}

/// Convert AppointmentCommand to CommandAction
///
/// This is the ONLY place with a match on AppointmentCommandPayload.
impl From<&AppointmentCommand> for CommandAction {
    fn from(cmd: &AppointmentCommand) -> Self {
        let now_millis = shared::util::now_millis();
        match &cmd.payload {
            AppointmentCommandPayload::CreateAppointment { .. } => {
                // CreateAppointment needs chair/hours/offerings resolved from
                // the catalog; AppointmentsManager builds it directly
                unreachable!(
                    "CreateAppointment is built by AppointmentsManager, not From<&AppointmentCommand>"
                )
            }
            AppointmentCommandPayload::SubmitDecision {
                appointment_id,
                party,
                decision,
            } => CommandAction::SubmitDecision(SubmitDecisionAction {
                appointment_id: appointment_id.clone(),
                party: *party,
                decision: *decision,
                now_millis,
            }),
            AppointmentCommandPayload::CompleteAppointment { appointment_id } => {
                CommandAction::CompleteAppointment(CompleteAppointmentAction {
                    appointment_id: appointment_id.clone(),
                    now_millis,
                })
            }
            AppointmentCommandPayload::CancelAppointment {
                appointment_id,
                cancelling_user_id,
                reason,
            } => CommandAction::CancelAppointment(CancelAppointmentAction {
                appointment_id: appointment_id.clone(),
                cancelling_user_id: cancelling_user_id.clone(),
                reason: reason.clone(),
                now_millis,
            }),
        }
    }
}
