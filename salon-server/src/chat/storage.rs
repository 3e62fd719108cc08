//! redb-based storage for chat threads and messages
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `threads` | `thread_id` | `ChatThread` | Thread records |
//! | `messages` | `(thread_id, created_at, message_id)` | `()` | Per-thread time ordering |
//! | `message_bodies` | `message_id` | `ChatMessage` | Message content |
//! | `read_marks` | `(thread_id, user_id)` | `i64` | Last-read timestamp per user |
//! | `appointment_threads` | `appointment_id` | `thread_id` | Appointment → thread lookup |
//!
//! 消息不可变：一旦写入 `message_bodies` 就不再修改。未读数从
//! `read_marks` 与消息时间戳推导，永不单独存储。

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use shared::appointment::AppointmentStatus;
use shared::models::{ChatMessage, ChatThread};

const THREADS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("threads");

/// Ordering index: key = (thread_id, created_at, message_id)
const MESSAGES_TABLE: TableDefinition<(&str, i64, &str), ()> = TableDefinition::new("messages");

const MESSAGE_BODIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("message_bodies");

/// Last-read timestamp: key = (thread_id, user_id), value = Unix millis
const READ_MARKS_TABLE: TableDefinition<(&str, &str), i64> = TableDefinition::new("read_marks");

const APPOINTMENT_THREADS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("appointment_threads");

/// Chat storage errors
#[derive(Debug, Error)]
pub enum ChatStorageError {
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
}

pub type ChatStorageResult<T> = Result<T, ChatStorageError>;

/// Chat storage backed by redb
#[derive(Clone)]
pub struct ChatStorage {
    db: Arc<Database>,
}

impl ChatStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> ChatStorageResult<Self> {
        let db = Database::create(path)?;
        Self::initialize(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> ChatStorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::initialize(db)
    }

    fn initialize(db: Database) -> ChatStorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(THREADS_TABLE)?;
            let _ = write_txn.open_table(MESSAGES_TABLE)?;
            let _ = write_txn.open_table(MESSAGE_BODIES_TABLE)?;
            let _ = write_txn.open_table(READ_MARKS_TABLE)?;
            let _ = write_txn.open_table(APPOINTMENT_THREADS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Threads ==========

    /// Insert or replace a thread, maintaining the appointment lookup
    pub fn upsert_thread(&self, thread: &ChatThread) -> ChatStorageResult<()> {
        let value = serde_json::to_vec(thread)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(THREADS_TABLE)?;
            table.insert(thread.thread_id.as_str(), value.as_slice())?;
        }
        if let Some(appointment_id) = &thread.appointment_id {
            let mut index = txn.open_table(APPOINTMENT_THREADS_TABLE)?;
            index.insert(appointment_id.as_str(), thread.thread_id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get a thread by id
    pub fn get_thread(&self, thread_id: &str) -> ChatStorageResult<Option<ChatThread>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(THREADS_TABLE)?;
        match table.get(thread_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Thread id bound to an appointment, if one was created
    pub fn thread_id_for_appointment(
        &self,
        appointment_id: &str,
    ) -> ChatStorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(APPOINTMENT_THREADS_TABLE)?;
        Ok(table.get(appointment_id)?.map(|g| g.value().to_string()))
    }

    /// All threads, unsorted
    pub fn list_threads(&self) -> ChatStorageResult<Vec<ChatThread>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(THREADS_TABLE)?;
        let mut threads = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            threads.push(serde_json::from_slice(value.value())?);
        }
        Ok(threads)
    }

    /// Update the mirrored appointment status of a thread
    ///
    /// No-op when the thread does not exist (the appointment may never have
    /// opened a chat).
    pub fn set_thread_status(
        &self,
        thread_id: &str,
        status: AppointmentStatus,
        updated_at: i64,
    ) -> ChatStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let existing = {
                let table = txn.open_table(THREADS_TABLE)?;
                table.get(thread_id)?.map(|g| g.value().to_vec())
            };
            if let Some(bytes) = existing {
                let mut thread: ChatThread = serde_json::from_slice(&bytes)?;
                thread.status = Some(status);
                thread.updated_at = updated_at;
                let value = serde_json::to_vec(&thread)?;
                let mut table = txn.open_table(THREADS_TABLE)?;
                table.insert(thread_id, value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Messages ==========

    /// Store a message and refresh the thread's preview fields atomically
    pub fn store_message(&self, message: &ChatMessage) -> ChatStorageResult<()> {
        let body = serde_json::to_vec(message)?;
        let txn = self.db.begin_write()?;
        {
            let mut bodies = txn.open_table(MESSAGE_BODIES_TABLE)?;
            bodies.insert(message.message_id.as_str(), body.as_slice())?;
        }
        {
            let mut index = txn.open_table(MESSAGES_TABLE)?;
            index.insert(
                (
                    message.thread_id.as_str(),
                    message.created_at,
                    message.message_id.as_str(),
                ),
                (),
            )?;
        }
        {
            let existing = {
                let table = txn.open_table(THREADS_TABLE)?;
                table.get(message.thread_id.as_str())?.map(|g| g.value().to_vec())
            };
            if let Some(bytes) = existing {
                let mut thread: ChatThread = serde_json::from_slice(&bytes)?;
                thread.last_message_preview = Some(preview_of(&message.text));
                thread.last_message_at = Some(message.created_at);
                thread.updated_at = message.created_at;
                let value = serde_json::to_vec(&thread)?;
                let mut table = txn.open_table(THREADS_TABLE)?;
                table.insert(message.thread_id.as_str(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Messages of a thread, oldest first
    pub fn get_messages(&self, thread_id: &str) -> ChatStorageResult<Vec<ChatMessage>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(MESSAGES_TABLE)?;
        let bodies = read_txn.open_table(MESSAGE_BODIES_TABLE)?;

        let mut messages = Vec::new();
        for result in index.range((thread_id, i64::MIN, "")..)? {
            let (key, _value) = result?;
            let (key_thread, _, message_id) = key.value();
            if key_thread != thread_id {
                break;
            }
            if let Some(guard) = bodies.get(message_id)? {
                messages.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(messages)
    }

    // ========== Read marks ==========

    /// Advance a user's read mark; never moves backwards
    pub fn advance_read_mark(
        &self,
        thread_id: &str,
        user_id: &str,
        at_millis: i64,
    ) -> ChatStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(READ_MARKS_TABLE)?;
            let current = table.get((thread_id, user_id))?.map(|g| g.value()).unwrap_or(0);
            if at_millis > current {
                table.insert((thread_id, user_id), at_millis)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// A user's last-read timestamp in a thread (0 when never read)
    pub fn get_read_mark(&self, thread_id: &str, user_id: &str) -> ChatStorageResult<i64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(READ_MARKS_TABLE)?;
        Ok(table.get((thread_id, user_id))?.map(|g| g.value()).unwrap_or(0))
    }

    /// Messages newer than the user's read mark, excluding their own
    pub fn unread_count(&self, thread_id: &str, user_id: &str) -> ChatStorageResult<u32> {
        let mark = self.get_read_mark(thread_id, user_id)?;
        let mut count = 0;
        for message in self.get_messages(thread_id)? {
            if message.created_at > mark && message.sender_user_id != user_id {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Thread-list preview: first 64 chars of the message
fn preview_of(text: &str) -> String {
    const MAX_CHARS: usize = 64;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(MAX_CHARS).collect();
        format!("{}…", truncated)
    }
}
