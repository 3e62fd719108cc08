//! AppointmentsManager - Core command processing and event generation
//!
//! This module handles:
//! - Command validation and processing
//! - Event generation with global sequence numbers
//! - Persistence to redb (transactional)
//! - Snapshot updates
//! - Event broadcasting (via broadcast channel)
//! - Pending-approval expiry (sweep driven)
//!
//! # Command Flow
//!
//! ```text
//! execute_command(cmd)
//!     ├─ 1. Idempotency check (command_id)
//!     ├─ 2. Resolve catalog data (CreateAppointment only)
//!     ├─ 3. Begin write transaction
//!     ├─ 4. Create CommandContext
//!     ├─ 5. Convert command to action and execute
//!     ├─ 6. Apply events to snapshots via EventApplier
//!     ├─ 7. Persist events, snapshots and the day index
//!     ├─ 8. Mark command processed
//!     ├─ 9. Commit transaction
//!     ├─ 10. Broadcast event(s)
//!     └─ 11. Return response
//! ```

mod error;
pub use error::*;

use super::actions::{CommandAction, CreateAppointmentAction, ExpireAppointmentAction};
use super::appliers::EventAction;
use super::storage::{AppointmentStorage, StorageError};
use super::traits::{CommandContext, CommandHandler, CommandMetadata, EventApplier};
use crate::catalog::CatalogService;
use crate::utils::time;
use chrono_tz::Tz;
use shared::CommandResponse;
use shared::appointment::{
    AppointmentCommand, AppointmentCommandPayload, AppointmentEvent, AppointmentSnapshot,
    AppointmentStatus,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event broadcast channel capacity (支持高并发: 10000预约 × 4事件)
const EVENT_CHANNEL_CAPACITY: usize = 65536;

/// AppointmentsManager for command processing
///
/// The `epoch` field is a unique identifier generated on each startup.
/// Clients use it to detect server restarts and trigger full resync.
pub struct AppointmentsManager {
    storage: AppointmentStorage,
    event_tx: broadcast::Sender<AppointmentEvent>,
    /// Server instance epoch - unique ID generated on startup
    /// Used by clients to detect server restarts
    epoch: String,
    /// Catalog service for chair / working-hours / offering lookup
    catalog_service: Option<Arc<CatalogService>>,
    /// 业务时区
    tz: Tz,
    /// How long a new appointment may stay pending before it lapses
    pending_ttl_millis: i64,
}

impl std::fmt::Debug for AppointmentsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentsManager")
            .field("storage", &"<AppointmentStorage>")
            .field("event_tx", &"<broadcast::Sender>")
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl AppointmentsManager {
    /// Create a new AppointmentsManager with the given database path
    pub fn new(db_path: impl AsRef<Path>, tz: Tz, pending_ttl_millis: i64) -> ManagerResult<Self> {
        let storage = AppointmentStorage::open(db_path)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let epoch = uuid::Uuid::new_v4().to_string();
        tracing::info!(epoch = %epoch, "AppointmentsManager started with new epoch");
        Ok(Self {
            storage,
            event_tx,
            epoch,
            catalog_service: None,
            tz,
            pending_ttl_millis,
        })
    }

    /// Set the catalog service for chair and offering resolution
    ///
    /// Creation commands fail until this is wired; decision, completion,
    /// cancellation and expiry only need stored snapshots.
    pub fn set_catalog_service(&mut self, catalog_service: Arc<CatalogService>) {
        self.catalog_service = Some(catalog_service);
    }

    /// Create with existing storage (for testing)
    #[cfg(test)]
    pub fn with_storage(storage: AppointmentStorage) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            event_tx,
            epoch: uuid::Uuid::new_v4().to_string(),
            catalog_service: None,
            tz: chrono_tz::UTC,
            pending_ttl_millis: 24 * 3_600_000,
        }
    }

    /// Get the server epoch (unique per startup)
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentEvent> {
        self.event_tx.subscribe()
    }

    /// Get a reference to storage (for queries)
    pub fn storage(&self) -> &AppointmentStorage {
        &self.storage
    }

    /// Execute a command and return a response
    ///
    /// Generated events are broadcast to subscribers after commit.
    pub fn execute_command(&self, cmd: AppointmentCommand) -> CommandResponse {
        match self.process_command(cmd.clone()) {
            Ok((response, events)) => {
                for event in events {
                    if self.event_tx.send(event).is_err() {
                        tracing::warn!("Event broadcast failed: no active receivers");
                        break;
                    }
                }
                response
            }
            Err(err) => CommandResponse::error(cmd.command_id, err.into()),
        }
    }

    /// Process a command through the full pipeline
    fn process_command(
        &self,
        cmd: AppointmentCommand,
    ) -> ManagerResult<(CommandResponse, Vec<AppointmentEvent>)> {
        tracing::debug!(
            command_id = %cmd.command_id,
            operator_id = %cmd.operator_id,
            "Processing command"
        );

        // 1. Idempotency check
        if self.storage.is_command_processed(&cmd.command_id)? {
            tracing::debug!(command_id = %cmd.command_id, "Duplicate command, skipping");
            return Ok((CommandResponse::duplicate(cmd.command_id), vec![]));
        }

        // 2. For CreateAppointment: resolve the chair, its working hours for
        // the requested day and the selected offerings before opening the
        // transaction. The action itself never touches the catalog.
        let create_action = match &cmd.payload {
            AppointmentCommandPayload::CreateAppointment {
                chair_id,
                customer_id,
                customer_name,
                requester_role,
                date,
                start_time,
                slot_count,
                offering_ids,
            } => {
                let catalog = self.catalog_service.as_ref().ok_or_else(|| {
                    ManagerError::Internal("Catalog service not configured".to_string())
                })?;
                let chair = catalog.get_chair(chair_id).ok_or_else(|| {
                    ManagerError::Validation(format!("Unknown chair: {}", chair_id))
                })?;
                if !chair.is_active {
                    return Err(ManagerError::SlotUnavailable(format!(
                        "Chair {} is not accepting bookings",
                        chair_id
                    )));
                }
                let weekday = time::weekday_of(time::parse_date(date)?);
                let hours = catalog.hours_for_weekday(chair_id, weekday)?;
                let offerings = catalog.offerings_by_ids(offering_ids)?;
                if let Some(inactive) = offerings.iter().find(|o| !o.is_active) {
                    return Err(ManagerError::Validation(format!(
                        "Service offering {} is not available",
                        inactive.id
                    )));
                }
                Some(CreateAppointmentAction {
                    chair,
                    hours,
                    offerings,
                    customer_id: customer_id.clone(),
                    customer_name: customer_name.clone(),
                    requester_role: *requester_role,
                    date: date.clone(),
                    start_time: start_time.clone(),
                    slot_count: *slot_count,
                    pending_ttl_millis: self.pending_ttl_millis,
                    tz: self.tz,
                    now_millis: shared::util::now_millis(),
                })
            }
            _ => None,
        };

        // 3. Begin write transaction
        let txn = self.storage.begin_write()?;

        // Double-check inside the transaction (concurrent duplicate delivery)
        if self.storage.is_command_processed_txn(&txn, &cmd.command_id)? {
            tracing::debug!(command_id = %cmd.command_id, "Duplicate command (in txn), skipping");
            return Ok((CommandResponse::duplicate(cmd.command_id), vec![]));
        }

        let current_sequence = self.storage.get_current_sequence_txn(&txn)?;

        // 4. Create command context
        let mut ctx = CommandContext::new(&txn, &self.storage, current_sequence);
        let metadata = CommandMetadata {
            command_id: cmd.command_id.clone(),
            operator_id: cmd.operator_id.clone(),
            operator_name: cmd.operator_name.clone(),
            timestamp: cmd.timestamp,
        };

        // 5. Convert to action and execute
        let action: CommandAction = match create_action {
            Some(create) => CommandAction::CreateAppointment(create),
            None => (&cmd).into(),
        };
        let events = futures::executor::block_on(action.execute(&mut ctx, &metadata))
            .map_err(ManagerError::from)?;

        // 6. Apply events to snapshots
        for event in &events {
            let mut snapshot = ctx
                .load_snapshot(&event.appointment_id)
                .unwrap_or_else(|_| AppointmentSnapshot::new(event.appointment_id.clone()));
            let applier: EventAction = event.into();
            applier.apply(&mut snapshot, event);
            ctx.save_snapshot(snapshot);
        }

        // 7. Persist events
        for event in &events {
            self.storage.store_event(&txn, event)?;
        }

        // 8. Persist modified snapshots, maintain the active set and the
        // (chair, day) booking index. The index is append-only; readers
        // filter lapsed and cancelled bookings by status.
        for snapshot in ctx.modified_snapshots() {
            self.storage.store_snapshot(&txn, snapshot)?;
            if let Some(chair_id) = &snapshot.chair_id
                && !snapshot.date.is_empty()
            {
                self.storage
                    .index_day_booking(&txn, chair_id, &snapshot.date, &snapshot.appointment_id)?;
            }
            if snapshot.is_terminal() {
                self.storage
                    .mark_appointment_inactive(&txn, &snapshot.appointment_id)?;
            } else {
                self.storage
                    .mark_appointment_active(&txn, &snapshot.appointment_id)?;
            }
        }

        // 9. Update the global sequence counter
        let max_sequence = events
            .iter()
            .map(|e| e.sequence)
            .max()
            .unwrap_or(current_sequence);
        if max_sequence > current_sequence {
            self.storage.set_sequence(&txn, max_sequence)?;
        }

        // 10. Mark command processed
        self.storage.mark_command_processed(&txn, &cmd.command_id)?;

        // 11. Commit
        txn.commit().map_err(StorageError::from)?;

        let appointment_id = events.first().map(|e| e.appointment_id.clone());
        tracing::info!(
            command_id = %cmd.command_id,
            appointment_id = ?appointment_id,
            event_count = events.len(),
            "Command processed"
        );
        for event in &events {
            let resource = format!("appointment:{}", event.appointment_id);
            crate::audit_log!(event.operator_id, event.event_type, resource);
        }

        Ok((
            CommandResponse::success(cmd.command_id, appointment_id),
            events,
        ))
    }

    // ========== Expiry ==========

    /// Expire every active appointment whose pending deadline has passed
    ///
    /// Returns the number of appointments that actually lapsed. Appointments
    /// answered between the scan and the write are skipped, not failed.
    pub fn expire_overdue_appointments(&self) -> ManagerResult<usize> {
        let now = shared::util::now_millis();
        let overdue: Vec<String> = self
            .storage
            .get_active_appointments()?
            .into_iter()
            .filter(|s| s.status == AppointmentStatus::Pending && now > s.pending_expires_at)
            .map(|s| s.appointment_id)
            .collect();

        let mut expired = 0;
        for appointment_id in overdue {
            match self.expire_appointment(&appointment_id, now) {
                Ok(events) if !events.is_empty() => expired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        appointment_id = %appointment_id,
                        error = %e,
                        "Failed to expire appointment"
                    );
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "Pending appointments lapsed without approval");
        }
        Ok(expired)
    }

    /// Expire a single pending appointment whose deadline has passed
    ///
    /// Runs the same transactional pipeline as commands, with a synthesized
    /// system operator. Returns an empty vec when nothing had to change.
    pub fn expire_appointment(
        &self,
        appointment_id: &str,
        now_millis: i64,
    ) -> ManagerResult<Vec<AppointmentEvent>> {
        let txn = self.storage.begin_write()?;
        let current_sequence = self.storage.get_current_sequence_txn(&txn)?;
        let mut ctx = CommandContext::new(&txn, &self.storage, current_sequence);
        let metadata = CommandMetadata {
            command_id: format!("expire-{}-{}", appointment_id, now_millis),
            operator_id: "system".to_string(),
            operator_name: "system".to_string(),
            timestamp: now_millis,
        };

        let action = ExpireAppointmentAction {
            appointment_id: appointment_id.to_string(),
            now_millis,
        };
        let events = futures::executor::block_on(action.execute(&mut ctx, &metadata))
            .map_err(ManagerError::from)?;
        if events.is_empty() {
            // Answered or already expired; dropping the txn aborts it
            return Ok(vec![]);
        }

        for event in &events {
            let mut snapshot = ctx
                .load_snapshot(&event.appointment_id)
                .unwrap_or_else(|_| AppointmentSnapshot::new(event.appointment_id.clone()));
            let applier: EventAction = event.into();
            applier.apply(&mut snapshot, event);
            ctx.save_snapshot(snapshot);
        }
        for event in &events {
            self.storage.store_event(&txn, event)?;
        }
        for snapshot in ctx.modified_snapshots() {
            self.storage.store_snapshot(&txn, snapshot)?;
            if snapshot.is_terminal() {
                self.storage
                    .mark_appointment_inactive(&txn, &snapshot.appointment_id)?;
            }
        }
        let max_sequence = events
            .iter()
            .map(|e| e.sequence)
            .max()
            .unwrap_or(current_sequence);
        if max_sequence > current_sequence {
            self.storage.set_sequence(&txn, max_sequence)?;
        }
        txn.commit().map_err(StorageError::from)?;

        for event in &events {
            let resource = format!("appointment:{}", event.appointment_id);
            crate::audit_log!(event.operator_id, event.event_type, resource);
            if self.event_tx.send(event.clone()).is_err() {
                tracing::warn!("Event broadcast failed: no active receivers");
            }
        }
        Ok(events)
    }

    // ========== Queries ==========

    /// Get an appointment snapshot by ID
    pub fn get_snapshot(&self, appointment_id: &str) -> ManagerResult<Option<AppointmentSnapshot>> {
        Ok(self.storage.get_snapshot(appointment_id)?)
    }

    /// Get all active (non-terminal) appointments
    pub fn get_active_appointments(&self) -> ManagerResult<Vec<AppointmentSnapshot>> {
        Ok(self.storage.get_active_appointments()?)
    }

    /// Get the snapshots indexed under (chair, day)
    pub fn get_day_bookings(
        &self,
        chair_id: &str,
        date: &str,
    ) -> ManagerResult<Vec<AppointmentSnapshot>> {
        Ok(self.storage.get_day_bookings(chair_id, date)?)
    }

    /// Get the current global sequence number
    pub fn get_current_sequence(&self) -> ManagerResult<u64> {
        Ok(self.storage.get_current_sequence()?)
    }

    /// Get all events after the given sequence (for incremental sync)
    pub fn get_events_since(&self, sequence: u64) -> ManagerResult<Vec<AppointmentEvent>> {
        Ok(self.storage.get_events_since(sequence)?)
    }

    /// Get the full event history of one appointment
    pub fn get_events_for_appointment(
        &self,
        appointment_id: &str,
    ) -> ManagerResult<Vec<AppointmentEvent>> {
        Ok(self.storage.get_events_for_appointment(appointment_id)?)
    }

    /// Rebuild a snapshot by replaying the appointment's events
    ///
    /// Recovery path; the stored snapshot is authoritative in normal
    /// operation.
    pub fn rebuild_snapshot(&self, appointment_id: &str) -> ManagerResult<AppointmentSnapshot> {
        let events = self.storage.get_events_for_appointment(appointment_id)?;
        if events.is_empty() {
            return Err(ManagerError::AppointmentNotFound(appointment_id.to_string()));
        }
        let mut snapshot = AppointmentSnapshot::new(appointment_id.to_string());
        for event in &events {
            let applier: EventAction = event.into();
            applier.apply(&mut snapshot, event);
        }
        Ok(snapshot)
    }
}

impl Clone for AppointmentsManager {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            event_tx: self.event_tx.clone(),
            epoch: self.epoch.clone(),
            catalog_service: self.catalog_service.clone(),
            tz: self.tz,
            pending_ttl_millis: self.pending_ttl_millis,
        }
    }
}

#[cfg(test)]
mod tests;
