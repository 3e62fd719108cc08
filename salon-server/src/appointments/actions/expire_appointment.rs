//! ExpireAppointment handler (server-internal)
//!
//! Driven by the expiry sweep, never by a client command. Writes the
//! durable `AppointmentExpired` event for a Pending appointment whose
//! deadline has passed. Readers already treat such appointments as
//! `Unanswered` through the reducer; the sweep makes that judgement
//! permanent so replay and sync agree with it.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::appointments::traits::{
    AppointmentError, CommandContext, CommandHandler, CommandMetadata,
};
use shared::appointment::{
    AppointmentEvent, AppointmentEventType, AppointmentStatus, EventPayload,
};

/// ExpireAppointment action
///
/// Skips (empty event list) instead of failing when the appointment is no
/// longer Pending or not yet due: the sweep races with decisions and both
/// outcomes are fine.
#[derive(Debug, Clone)]
pub struct ExpireAppointmentAction {
    pub appointment_id: String,
    /// Server clock at sweep time
    pub now_millis: i64,
}

#[async_trait]
impl CommandHandler for ExpireAppointmentAction {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError> {
        // 1. Load current state
        let snapshot = ctx.load_snapshot(&self.appointment_id)?;

        // 2. Only stored-Pending appointments expire; anything else was
        //    decided or finalized since the sweep selected it
        if snapshot.status != AppointmentStatus::Pending {
            debug!(
                appointment_id = %self.appointment_id,
                status = %snapshot.status,
                "Skipping expiry, appointment no longer pending"
            );
            return Ok(vec![]);
        }

        // 3. The deadline itself is still answerable; expiry is strictly after
        if self.now_millis <= snapshot.pending_expires_at {
            debug!(
                appointment_id = %self.appointment_id,
                pending_expires_at = snapshot.pending_expires_at,
                "Skipping expiry, deadline not reached"
            );
            return Ok(vec![]);
        }

        // 4. Emit the expiry event
        let seq = ctx.next_sequence();
        let event = AppointmentEvent::new(
            seq,
            self.appointment_id.clone(),
            metadata.operator_id.clone(),
            metadata.operator_name.clone(),
            metadata.command_id.clone(),
            None,
            AppointmentEventType::AppointmentExpired,
            EventPayload::AppointmentExpired {},
        );

        info!(
            appointment_id = %self.appointment_id,
            seq,
            "Appointment expired without full approval"
        );
        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::storage::AppointmentStorage;
    use shared::appointment::{AppointmentSnapshot, PartyDecision, Responsibility};

    const EXPIRES: i64 = 1_000_000;

    fn sweep_metadata() -> CommandMetadata {
        CommandMetadata {
            command_id: "sweep-1".to_string(),
            operator_id: "system".to_string(),
            operator_name: "system".to_string(),
            timestamp: 1234567890,
        }
    }

    fn seed(
        storage: &AppointmentStorage,
        status: AppointmentStatus,
        store_decision: PartyDecision,
    ) -> redb::WriteTransaction {
        let txn = storage.begin_write().unwrap();
        let mut snapshot = AppointmentSnapshot::new("appt-1".to_string());
        snapshot.status = status;
        snapshot.store_decision = store_decision;
        snapshot.responsibility = Responsibility {
            store: true,
            provider: true,
        };
        snapshot.pending_expires_at = EXPIRES;
        storage.store_snapshot(&txn, &snapshot).unwrap();
        txn
    }

    fn action(now_millis: i64) -> ExpireAppointmentAction {
        ExpireAppointmentAction {
            appointment_id: "appt-1".to_string(),
            now_millis,
        }
    }

    #[tokio::test]
    async fn test_expire_overdue_pending() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let txn = seed(&storage, AppointmentStatus::Pending, PartyDecision::Pending);
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        let events = action(EXPIRES + 1)
            .execute(&mut ctx, &sweep_metadata())
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AppointmentEventType::AppointmentExpired);
        assert!(events[0].client_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_expire_at_deadline_skips() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let txn = seed(&storage, AppointmentStatus::Pending, PartyDecision::Pending);
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        // the deadline instant itself is still answerable
        let events = action(EXPIRES)
            .execute(&mut ctx, &sweep_metadata())
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_expire_partially_approved_pending() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        // store answered, provider never did
        let txn = seed(&storage, AppointmentStatus::Pending, PartyDecision::Approved);
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        let events = action(EXPIRES + 1)
            .execute(&mut ctx, &sweep_metadata())
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_approved_skips() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let txn = seed(&storage, AppointmentStatus::Approved, PartyDecision::Approved);
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        let events = action(EXPIRES + 1)
            .execute(&mut ctx, &sweep_metadata())
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_expire_rejected_skips() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let txn = seed(&storage, AppointmentStatus::Rejected, PartyDecision::Rejected);
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        let events = action(EXPIRES + 1)
            .execute(&mut ctx, &sweep_metadata())
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_expire_unknown_appointment_fails() {
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        let mut ctx = CommandContext::new(&txn, &storage, 0);

        let result = action(EXPIRES + 1)
            .execute(&mut ctx, &sweep_metadata())
            .await;

        assert!(matches!(
            result,
            Err(AppointmentError::AppointmentNotFound(_))
        ));
    }
}
