//! Core traits and context for appointment command processing
//!
//! `CommandHandler` implementations validate a command against current state
//! and emit events; `EventApplier` implementations fold one event into a
//! snapshot. Appliers are pure so snapshots can always be rebuilt from the
//! event stream.

use std::collections::HashMap;

use async_trait::async_trait;
use redb::WriteTransaction;
use thiserror::Error;

use super::storage::{AppointmentStorage, StorageError};
use shared::appointment::{AppointmentEvent, AppointmentSnapshot, AppointmentStatus};

/// Domain errors raised by command handlers
#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("Appointment {0} is already finalized as {1}")]
    AlreadyFinalized(String, AppointmentStatus),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not an authorized party: {0}")]
    NotAuthorizedParty(String),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for AppointmentError {
    fn from(err: StorageError) -> Self {
        AppointmentError::Storage(err.to_string())
    }
}

impl From<crate::utils::AppError> for AppointmentError {
    fn from(err: crate::utils::AppError) -> Self {
        use crate::utils::AppError;
        match err {
            AppError::AppointmentNotFound(id) => AppointmentError::AppointmentNotFound(id),
            AppError::SlotUnavailable(msg) => AppointmentError::SlotUnavailable(msg),
            AppError::InvalidTransition(msg) => AppointmentError::InvalidTransition(msg),
            AppError::NotAuthorizedParty(msg) => AppointmentError::NotAuthorizedParty(msg),
            AppError::Storage(e) => AppointmentError::Storage(e.to_string()),
            other => AppointmentError::Validation(other.to_string()),
        }
    }
}

/// Command metadata shared by all handlers
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    pub command_id: String,
    pub operator_id: String,
    pub operator_name: String,
    /// Client timestamp, Unix milliseconds
    pub timestamp: i64,
}

/// Mutable execution context for one command
///
/// Wraps the write transaction, tracks snapshots modified by the events of
/// this command, and allocates sequence numbers. `load_snapshot` consults
/// the modified set first so that successive events within one command see
/// each other's effects.
pub struct CommandContext<'a> {
    txn: &'a WriteTransaction,
    storage: &'a AppointmentStorage,
    /// Last allocated sequence number
    sequence: u64,
    modified: HashMap<String, AppointmentSnapshot>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        txn: &'a WriteTransaction,
        storage: &'a AppointmentStorage,
        current_sequence: u64,
    ) -> Self {
        Self {
            txn,
            storage,
            sequence: current_sequence,
            modified: HashMap::new(),
        }
    }

    /// Allocate the next global sequence number
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Load a snapshot, preferring in-flight modifications over storage
    pub fn load_snapshot(
        &self,
        appointment_id: &str,
    ) -> Result<AppointmentSnapshot, AppointmentError> {
        if let Some(snapshot) = self.modified.get(appointment_id) {
            return Ok(snapshot.clone());
        }
        self.storage
            .get_snapshot_txn(self.txn, appointment_id)?
            .ok_or_else(|| AppointmentError::AppointmentNotFound(appointment_id.to_string()))
    }

    /// Record a snapshot as modified by this command
    pub fn save_snapshot(&mut self, snapshot: AppointmentSnapshot) {
        self.modified
            .insert(snapshot.appointment_id.clone(), snapshot);
    }

    /// Snapshots modified during command execution
    pub fn modified_snapshots(&self) -> impl Iterator<Item = &AppointmentSnapshot> {
        self.modified.values()
    }

    /// Bookings indexed under (chair, date), read through this transaction
    pub fn day_bookings(
        &self,
        chair_id: &str,
        date: &str,
    ) -> Result<Vec<AppointmentSnapshot>, AppointmentError> {
        Ok(self.storage.get_day_bookings_txn(self.txn, chair_id, date)?)
    }
}

/// Command handler - validates and generates events
#[async_trait]
pub trait CommandHandler {
    async fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Vec<AppointmentEvent>, AppointmentError>;
}

/// Event applier - folds one event into a snapshot
///
/// Appliers must be pure: no storage access, no clock reads. Everything
/// they need is recorded on the event.
pub trait EventApplier {
    fn apply(&self, snapshot: &mut AppointmentSnapshot, event: &AppointmentEvent);
}
