//! SubmitDecision command handler
//!
//! Records one party's approve/reject answer and derives the resulting
//! composite status through the reducer. Resubmitting the decision a party
//! has already recorded is a no-op, not an error, so client retries are
//! always safe.

use async_trait::async_trait;
use tracing::info;

use crate::appointments::reducer;
use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use shared::appointment::{
    AppointmentEvent, AppointmentEventType, DecisionParty, EventPayload, PartyDecision,
};

/// SubmitDecision action
///
/// The operator must be the party account itself (the appointment's
/// `store_id` or `provider_id`); mapping staff users to their store is a
/// concern of the layer above.
#[derive(Debug, Clone)]
pub struct SubmitDecisionAction {
    pub appointment_id: String,
    pub party: DecisionParty,
    pub decision: PartyDecision,
    /// Server clock at command arrival
    pub now_millis: i64,
}

#[async_trait]
impl CommandHandler for SubmitDecisionAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        info!(
            appointment_id = %self.appointment_id,
            party = %self.party,
            decision = ?self.decision,
            "SubmitDecisionAction::execute starting"
        );

        // 1. Only explicit answers can be submitted; Pending and NoAnswer
        //    are derived states
        if !matches!(
            self.decision,
            PartyDecision::Approved | PartyDecision::Rejected
        ) {
            return Err(AppointmentError::Validation(format!(
                "Decision must be APPROVED or REJECTED, got {:?}",
                self.decision
            )));
        }

        // 2. Load current state
        let snapshot = ctx.load_snapshot(&self.appointment_id)?;

        // 3. The submitting party must hold approval rights on this
        //    appointment, and the operator must be that party's account
        let responsible = match self.party {
            DecisionParty::Store => snapshot.responsibility.store,
            DecisionParty::Provider => snapshot.responsibility.provider,
        };
        if !responsible {
            return Err(AppointmentError::NotAuthorizedParty(format!(
                "{} has no approval rights on appointment {}",
                self.party, self.appointment_id
            )));
        }
        let party_account = match self.party {
            DecisionParty::Store => snapshot.store_id.as_deref(),
            DecisionParty::Provider => snapshot.provider_id.as_deref(),
        };
        if party_account != Some(metadata.operator_id.as_str()) {
            return Err(AppointmentError::NotAuthorizedParty(format!(
                "Operator {} cannot answer for {} on appointment {}",
                metadata.operator_id, self.party, self.appointment_id
            )));
        }

        // 4. Same decision again is an idempotent retry; answer before the
        //    terminal check so retries of the decisive submission succeed
        if snapshot.decision_of(self.party) == self.decision {
            info!(
                appointment_id = %self.appointment_id,
                party = %self.party,
                "Decision already recorded, no-op"
            );
            return Ok(vec![]);
        }

        // 5. Terminal appointments accept no new decisions; a lapsed
        //    Pending counts as Unanswered even before the sweep wrote it
        let effective = reducer::effective_status(&snapshot, self.now_millis);
        if effective.is_terminal() {
            return Err(AppointmentError::AlreadyFinalized(
                self.appointment_id.clone(),
                effective,
            ));
        }

        // 6. Run the reducer over the updated decision pair
        let (store_decision, provider_decision) = match self.party {
            DecisionParty::Store => (self.decision, snapshot.provider_decision),
            DecisionParty::Provider => (snapshot.store_decision, self.decision),
        };
        let resulting_status = reducer::composite_status(
            store_decision,
            provider_decision,
            snapshot.responsibility,
            self.now_millis,
            snapshot.pending_expires_at,
        );

        // 7. Emit the decision event
        let seq = ctx.next_sequence();
        let event = AppointmentEvent::new(
            seq,
            self.appointment_id.clone(),
            metadata.operator_id.clone(),
            metadata.operator_name.clone(),
            metadata.command_id.clone(),
            Some(metadata.timestamp),
            AppointmentEventType::DecisionSubmitted,
            EventPayload::DecisionSubmitted {
                party: self.party,
                decision: self.decision,
                resulting_status,
            },
        );

        info!(
            appointment_id = %self.appointment_id,
            party = %self.party,
            resulting_status = %resulting_status,
            seq,
            "SubmitDecisionAction::execute completed"
        );
        Ok(vec![event])
    }
}
