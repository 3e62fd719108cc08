//! Chat thread and message models (聊天会话)
//!
//! Threads come in two kinds:
//!
//! | Kind        | `appointment_id` | `status`             | Lifetime              |
//! |-------------|------------------|----------------------|-----------------------|
//! | Appointment | Some             | mirrors appointment  | bound to appointment  |
//! | Favorite    | None             | None                 | standing relationship |
//!
//! Send permission is always recomputed from `status`/`is_favorite_thread`,
//! never cached on the thread.

use serde::{Deserialize, Serialize};

use super::participant::Participant;
use crate::appointment::AppointmentStatus;

/// Chat thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub thread_id: String,
    pub title: String,
    /// Bound appointment, None for favorite threads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    /// Mirrored appointment status; None for favorite threads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub is_favorite_thread: bool,
    /// Unique by user_id
    pub participants: Vec<Participant>,
    /// Unread messages for the requesting actor
    #[serde(default)]
    pub unread_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatThread {
    pub fn is_appointment_bound(&self) -> bool {
        self.appointment_id.is_some() && !self.is_favorite_thread
    }
}

/// Chat message - immutable once created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub message_id: String,
    pub thread_id: String,
    pub sender_user_id: String,
    pub text: String,
    /// Server timestamp, Unix milliseconds. Authoritative for ordering.
    pub created_at: i64,
}

/// Send-message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageInput {
    pub sender_user_id: String,
    pub text: String,
}
