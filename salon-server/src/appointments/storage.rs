//! redb-based storage layer for appointment event sourcing
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `events` | `(appointment_id, sequence)` | `AppointmentEvent` | Event stream (append-only) |
//! | `snapshots` | `appointment_id` | `AppointmentSnapshot` | Snapshot cache |
//! | `active_appointments` | `appointment_id` | `()` | Non-terminal appointment index |
//! | `processed_commands` | `command_id` | `()` | Idempotency check |
//! | `sequence_counter` | `"seq"` | `u64` | Global sequence |
//! | `day_bookings` | `(resource_day, appointment_id)` | `()` | Per chair+date booking index |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the data
//! is on disk and the file is in a consistent state even across power loss.
//!
//! # Day index
//!
//! 按资源+日期的预约索引，只增不删。终态预约（取消/拒绝/无应答）仍留在索引里，
//! 读取方按快照状态过滤，快照才是唯一事实来源。

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::appointment::{AppointmentEvent, AppointmentSnapshot};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for storing events: key = (appointment_id, sequence), value = JSON-serialized AppointmentEvent
const EVENTS_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("events");

/// Table for storing snapshots: key = appointment_id, value = JSON-serialized AppointmentSnapshot
const SNAPSHOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Table for tracking non-terminal appointments: key = appointment_id, value = empty (existence check)
const ACTIVE_APPOINTMENTS_TABLE: TableDefinition<&str, ()> =
    TableDefinition::new("active_appointments");

/// Table for tracking processed commands: key = command_id, value = empty (idempotency)
const PROCESSED_COMMANDS_TABLE: TableDefinition<&str, ()> =
    TableDefinition::new("processed_commands");

/// Table for sequence counter: key = "seq", value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

/// Table for the day-booking index: key = ("{resource_id}:{date}", appointment_id)
const DAY_BOOKINGS_TABLE: TableDefinition<(&str, &str), ()> = TableDefinition::new("day_bookings");

const SEQUENCE_KEY: &str = "seq";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("Event not found: appointment_id={0}, sequence={1}")]
    EventNotFound(String, u64),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Appointment storage backed by redb
#[derive(Clone)]
pub struct AppointmentStorage {
    db: Arc<Database>,
}

impl AppointmentStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::initialize(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::initialize(db)
    }

    fn initialize(db: Database) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(EVENTS_TABLE)?;
            let _ = write_txn.open_table(SNAPSHOTS_TABLE)?;
            let _ = write_txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;
            let _ = write_txn.open_table(PROCESSED_COMMANDS_TABLE)?;
            let _ = write_txn.open_table(DAY_BOOKINGS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(SEQUENCE_KEY)?.is_none() {
                seq_table.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Sequence Operations ==========

    /// Get current sequence (read-only)
    pub fn get_current_sequence(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEQUENCE_TABLE)?;
        Ok(table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Get current sequence (within transaction)
    pub fn get_current_sequence_txn(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let table = txn.open_table(SEQUENCE_TABLE)?;
        Ok(table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Set sequence number (within transaction)
    ///
    /// Used by the action-based architecture to update sequence after events are generated.
    pub fn set_sequence(&self, txn: &WriteTransaction, sequence: u64) -> StorageResult<()> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        table.insert(SEQUENCE_KEY, sequence)?;
        Ok(())
    }

    // ========== Command Idempotency ==========

    /// Check if a command has been processed
    pub fn is_command_processed(&self, command_id: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_COMMANDS_TABLE)?;
        Ok(table.get(command_id)?.is_some())
    }

    /// Check if a command has been processed (within transaction)
    pub fn is_command_processed_txn(
        &self,
        txn: &WriteTransaction,
        command_id: &str,
    ) -> StorageResult<bool> {
        let table = txn.open_table(PROCESSED_COMMANDS_TABLE)?;
        Ok(table.get(command_id)?.is_some())
    }

    /// Mark a command as processed
    pub fn mark_command_processed(
        &self,
        txn: &WriteTransaction,
        command_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(PROCESSED_COMMANDS_TABLE)?;
        table.insert(command_id, ())?;
        Ok(())
    }

    // ========== Event Operations ==========

    /// Store an event
    pub fn store_event(
        &self,
        txn: &WriteTransaction,
        event: &AppointmentEvent,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(EVENTS_TABLE)?;
        let key = (event.appointment_id.as_str(), event.sequence);
        let value = serde_json::to_vec(event)?;
        table.insert(key, value.as_slice())?;
        Ok(())
    }

    /// Get all events for an appointment
    pub fn get_events_for_appointment(
        &self,
        appointment_id: &str,
    ) -> StorageResult<Vec<AppointmentEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;

        let mut events = Vec::new();
        let range_start = (appointment_id, 0u64);
        let range_end = (appointment_id, u64::MAX);

        for result in table.range(range_start..=range_end)? {
            let (_key, value) = result?;
            let event: AppointmentEvent = serde_json::from_slice(value.value())?;
            events.push(event);
        }

        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    /// Get events since a given sequence (across all appointments)
    pub fn get_events_since(&self, since_sequence: u64) -> StorageResult<Vec<AppointmentEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;

        let mut events = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let event: AppointmentEvent = serde_json::from_slice(value.value())?;
            if event.sequence > since_sequence {
                events.push(event);
            }
        }

        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    // ========== Snapshot Operations ==========

    /// Store a snapshot
    pub fn store_snapshot(
        &self,
        txn: &WriteTransaction,
        snapshot: &AppointmentSnapshot,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(SNAPSHOTS_TABLE)?;
        let value = serde_json::to_vec(snapshot)?;
        table.insert(snapshot.appointment_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a snapshot by appointment ID
    pub fn get_snapshot(&self, appointment_id: &str) -> StorageResult<Option<AppointmentSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNAPSHOTS_TABLE)?;

        match table.get(appointment_id)? {
            Some(value) => {
                let snapshot: AppointmentSnapshot = serde_json::from_slice(value.value())?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Get a snapshot by appointment ID (within transaction)
    pub fn get_snapshot_txn(
        &self,
        txn: &WriteTransaction,
        appointment_id: &str,
    ) -> StorageResult<Option<AppointmentSnapshot>> {
        let table = txn.open_table(SNAPSHOTS_TABLE)?;

        match table.get(appointment_id)? {
            Some(value) => {
                let snapshot: AppointmentSnapshot = serde_json::from_slice(value.value())?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Get all snapshots
    pub fn get_all_snapshots(&self) -> StorageResult<Vec<AppointmentSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNAPSHOTS_TABLE)?;

        let mut snapshots = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let snapshot: AppointmentSnapshot = serde_json::from_slice(value.value())?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    // ========== Active Appointments ==========

    /// Mark an appointment as active (non-terminal)
    pub fn mark_appointment_active(
        &self,
        txn: &WriteTransaction,
        appointment_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;
        table.insert(appointment_id, ())?;
        Ok(())
    }

    /// Mark an appointment as inactive (reached a terminal status)
    pub fn mark_appointment_inactive(
        &self,
        txn: &WriteTransaction,
        appointment_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;
        table.remove(appointment_id)?;
        Ok(())
    }

    /// Check if an appointment is active
    pub fn is_appointment_active(&self, appointment_id: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;
        Ok(table.get(appointment_id)?.is_some())
    }

    /// Get all active appointment IDs
    pub fn get_active_appointment_ids(&self) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;

        let mut ids: Vec<String> = Vec::new();
        for result in table.iter()? {
            let (key, _value) = result?;
            ids.push(key.value().to_string());
        }

        Ok(ids)
    }

    /// Get all active appointment snapshots
    pub fn get_active_appointments(&self) -> StorageResult<Vec<AppointmentSnapshot>> {
        let active_ids = self.get_active_appointment_ids()?;
        let mut snapshots = Vec::new();

        for appointment_id in active_ids {
            if let Some(snapshot) = self.get_snapshot(&appointment_id)? {
                snapshots.push(snapshot);
            }
        }

        Ok(snapshots)
    }

    // ========== Day Booking Index ==========

    fn day_key(resource_id: &str, date: &str) -> String {
        format!("{resource_id}:{date}")
    }

    /// Index an appointment under (resource, date)
    pub fn index_day_booking(
        &self,
        txn: &WriteTransaction,
        resource_id: &str,
        date: &str,
        appointment_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(DAY_BOOKINGS_TABLE)?;
        let day = Self::day_key(resource_id, date);
        table.insert((day.as_str(), appointment_id), ())?;
        Ok(())
    }

    /// Appointment IDs indexed under (resource, date), regardless of status
    pub fn get_day_booking_ids(&self, resource_id: &str, date: &str) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DAY_BOOKINGS_TABLE)?;

        let day = Self::day_key(resource_id, date);
        let mut ids = Vec::new();
        for result in table.range((day.as_str(), "")..)? {
            let (key, _value) = result?;
            let (key_day, appointment_id) = key.value();
            if key_day != day {
                break;
            }
            ids.push(appointment_id.to_string());
        }

        Ok(ids)
    }

    /// Snapshots indexed under (resource, date), regardless of status
    ///
    /// The index is append-only; callers filter by snapshot status
    /// (e.g. `blocks_slots()`) to decide what counts as a booking.
    pub fn get_day_bookings(
        &self,
        resource_id: &str,
        date: &str,
    ) -> StorageResult<Vec<AppointmentSnapshot>> {
        let ids = self.get_day_booking_ids(resource_id, date)?;
        let mut snapshots = Vec::new();

        for appointment_id in ids {
            if let Some(snapshot) = self.get_snapshot(&appointment_id)? {
                snapshots.push(snapshot);
            }
        }

        Ok(snapshots)
    }

    /// Snapshots indexed under (resource, date), read within a write transaction
    ///
    /// Used by create-appointment overlap checks so the read and the
    /// subsequent write land in the same transaction.
    pub fn get_day_bookings_txn(
        &self,
        txn: &WriteTransaction,
        resource_id: &str,
        date: &str,
    ) -> StorageResult<Vec<AppointmentSnapshot>> {
        let index_table = txn.open_table(DAY_BOOKINGS_TABLE)?;
        let snapshots_table = txn.open_table(SNAPSHOTS_TABLE)?;

        let day = Self::day_key(resource_id, date);
        let mut snapshots = Vec::new();
        for result in index_table.range((day.as_str(), "")..)? {
            let (key, _value) = result?;
            let (key_day, appointment_id) = key.value();
            if key_day != day {
                break;
            }
            if let Some(value) = snapshots_table.get(appointment_id)? {
                let snapshot: AppointmentSnapshot = serde_json::from_slice(value.value())?;
                snapshots.push(snapshot);
            }
        }

        Ok(snapshots)
    }

    // ========== Statistics ==========

    /// Get storage statistics
    pub fn get_stats(&self) -> StorageResult<StorageStats> {
        let read_txn = self.db.begin_read()?;

        let events_table = read_txn.open_table(EVENTS_TABLE)?;
        let snapshots_table = read_txn.open_table(SNAPSHOTS_TABLE)?;
        let active_table = read_txn.open_table(ACTIVE_APPOINTMENTS_TABLE)?;
        let commands_table = read_txn.open_table(PROCESSED_COMMANDS_TABLE)?;
        let seq_table = read_txn.open_table(SEQUENCE_TABLE)?;

        Ok(StorageStats {
            event_count: events_table.len()?,
            snapshot_count: snapshots_table.len()?,
            active_appointment_count: active_table.len()?,
            processed_command_count: commands_table.len()?,
            current_sequence: seq_table
                .get(SEQUENCE_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0),
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub event_count: u64,
    pub snapshot_count: u64,
    pub active_appointment_count: u64,
    pub processed_command_count: u64,
    pub current_sequence: u64,
}
