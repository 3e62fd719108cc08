//! Chat service - thread lifecycle, message delivery and read tracking
//!
//! 会话分两类:预约会话(绑定预约,随预约状态开闭)与收藏会话(长期有效,
//! 永远可发送)。预约会话在第一条消息发出时惰性创建,不随预约创建。
//!
//! Send permission is re-derived on every send from the appointment's
//! effective status, never cached on the thread: a pending appointment that
//! lapsed a second ago already refuses new messages even before the expiry
//! sweep has made the lapse durable.
//!
//! Delivery order mirrors the appointment pipeline: persist first, broadcast
//! only after the write is durable.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;

use shared::appointment::{AppointmentSnapshot, AppointmentStatus};
use shared::message::{NewMessagePayload, TypingPayload};
use shared::models::{ChatMessage, ChatMessageInput, ChatThread, Participant, ParticipantRole};

use crate::appointments::{AppointmentsManager, reducer};
use crate::utils::{AppError, AppResult};

use super::storage::ChatStorage;

/// 聊天事件通道容量
const CHAT_CHANNEL_CAPACITY: usize = 8192;

/// Events published by the chat service once a state change is durable
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message was stored and should be pushed to connected clients
    NewMessage(NewMessagePayload),
    /// A participant's typing state, relayed without persistence
    Typing(TypingPayload),
    /// Thread metadata changed (mirrored appointment status)
    ThreadUpdated(ChatThread),
}

/// Chat service over its own database, separate from appointment storage
pub struct ChatService {
    storage: ChatStorage,
    appointments: Arc<AppointmentsManager>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatService {
    /// Open or create the chat database at the given path
    pub fn new(
        db_path: impl AsRef<Path>,
        appointments: Arc<AppointmentsManager>,
    ) -> AppResult<Self> {
        let storage = ChatStorage::open(db_path)?;
        Ok(Self::with_parts(storage, appointments))
    }

    #[cfg(test)]
    pub fn with_storage(storage: ChatStorage, appointments: Arc<AppointmentsManager>) -> Self {
        Self::with_parts(storage, appointments)
    }

    fn with_parts(storage: ChatStorage, appointments: Arc<AppointmentsManager>) -> Self {
        let (event_tx, _) = broadcast::channel(CHAT_CHANNEL_CAPACITY);
        Self {
            storage,
            appointments,
            event_tx,
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    // ========== Sending ==========

    /// Send a message into an appointment's thread, creating the thread on
    /// first send.
    ///
    /// The thread is only materialized when the appointment still accepts
    /// messages, so a closed appointment never grows an empty thread.
    pub fn send_to_appointment(
        &self,
        appointment_id: &str,
        input: ChatMessageInput,
    ) -> AppResult<ChatMessage> {
        let snapshot = self
            .appointments
            .storage()
            .get_snapshot(appointment_id)?
            .ok_or_else(|| AppError::AppointmentNotFound(appointment_id.to_string()))?;

        let now = shared::util::now_millis();
        ensure_open(&snapshot, now)?;

        let thread = match self.storage.thread_id_for_appointment(appointment_id)? {
            Some(thread_id) => self
                .storage
                .get_thread(&thread_id)?
                .ok_or_else(|| AppError::ThreadNotFound(thread_id))?,
            None => {
                let thread = thread_from_snapshot(&snapshot, now);
                self.storage.upsert_thread(&thread)?;
                tracing::info!(
                    thread_id = %thread.thread_id,
                    appointment_id,
                    "Chat thread opened for appointment"
                );
                thread
            }
        };

        self.persist_and_publish(&thread, input, now)
    }

    /// Send a message into an existing thread
    pub fn send_to_thread(
        &self,
        thread_id: &str,
        input: ChatMessageInput,
    ) -> AppResult<ChatMessage> {
        let thread = self
            .storage
            .get_thread(thread_id)?
            .ok_or_else(|| AppError::ThreadNotFound(thread_id.to_string()))?;

        let now = shared::util::now_millis();
        if let Some(appointment_id) = &thread.appointment_id
            && thread.is_appointment_bound()
        {
            let snapshot = self
                .appointments
                .storage()
                .get_snapshot(appointment_id)?
                .ok_or_else(|| AppError::AppointmentNotFound(appointment_id.clone()))?;
            ensure_open(&snapshot, now)?;
        }

        self.persist_and_publish(&thread, input, now)
    }

    /// Store the message and broadcast it. The caller has already gated.
    fn persist_and_publish(
        &self,
        thread: &ChatThread,
        input: ChatMessageInput,
        now_millis: i64,
    ) -> AppResult<ChatMessage> {
        let text = input.text.trim();
        if text.is_empty() {
            return Err(AppError::validation("Message text is empty"));
        }

        let message = ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread.thread_id.clone(),
            sender_user_id: input.sender_user_id,
            text: text.to_string(),
            created_at: now_millis,
        };
        self.storage.store_message(&message)?;

        let _ = self.event_tx.send(ChatEvent::NewMessage(NewMessagePayload {
            thread_id: message.thread_id.clone(),
            sender_user_id: message.sender_user_id.clone(),
            message_id: message.message_id.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
        }));

        tracing::debug!(
            thread_id = %message.thread_id,
            message_id = %message.message_id,
            "Message stored"
        );
        Ok(message)
    }

    // ========== Read tracking ==========

    /// Mark everything in a thread as read for a user.
    ///
    /// Idempotent: the mark only ever moves forward.
    pub fn mark_read(&self, thread_id: &str, user_id: &str) -> AppResult<()> {
        let thread = self
            .storage
            .get_thread(thread_id)?
            .ok_or_else(|| AppError::ThreadNotFound(thread_id.to_string()))?;
        if let Some(at) = thread.last_message_at {
            self.storage.advance_read_mark(thread_id, user_id, at)?;
        }
        Ok(())
    }

    // ========== Typing ==========

    /// Relay a typing indicator to the thread's other clients.
    ///
    /// Typing state is transient and never stored.
    pub fn notify_typing(&self, payload: TypingPayload) -> AppResult<()> {
        if self.storage.get_thread(&payload.thread_id)?.is_none() {
            return Err(AppError::ThreadNotFound(payload.thread_id));
        }
        let _ = self.event_tx.send(ChatEvent::Typing(payload));
        Ok(())
    }

    // ========== Threads ==========

    /// Create a standing favorite thread, detached from any appointment
    pub fn create_favorite_thread(
        &self,
        title: &str,
        participants: Vec<Participant>,
    ) -> AppResult<ChatThread> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Thread title is empty"));
        }
        if participants.is_empty() {
            return Err(AppError::validation("Thread needs at least one participant"));
        }

        let now = shared::util::now_millis();
        let thread = ChatThread {
            thread_id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            appointment_id: None,
            status: None,
            is_favorite_thread: true,
            participants,
            unread_count: 0,
            last_message_preview: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.upsert_thread(&thread)?;
        tracing::info!(thread_id = %thread.thread_id, "Favorite thread created");
        Ok(thread)
    }

    /// A thread by id, with the unread count computed for the viewer
    pub fn get_thread(&self, thread_id: &str, viewer: Option<&str>) -> AppResult<ChatThread> {
        let mut thread = self
            .storage
            .get_thread(thread_id)?
            .ok_or_else(|| AppError::ThreadNotFound(thread_id.to_string()))?;
        if let Some(user_id) = viewer {
            thread.unread_count = self.storage.unread_count(thread_id, user_id)?;
        }
        Ok(thread)
    }

    /// The thread bound to an appointment, if one was ever opened
    pub fn thread_by_appointment(
        &self,
        appointment_id: &str,
        viewer: Option<&str>,
    ) -> AppResult<Option<ChatThread>> {
        match self.storage.thread_id_for_appointment(appointment_id)? {
            Some(thread_id) => Ok(Some(self.get_thread(&thread_id, viewer)?)),
            None => Ok(None),
        }
    }

    /// All threads a user participates in, most recently active first
    pub fn threads_for_user(&self, user_id: &str) -> AppResult<Vec<ChatThread>> {
        let key = Participant::normalized_key(user_id);
        let mut threads: Vec<ChatThread> = self
            .storage
            .list_threads()?
            .into_iter()
            .filter(|t| {
                t.participants
                    .iter()
                    .any(|p| Participant::normalized_key(&p.user_id) == key)
            })
            .collect();
        for thread in &mut threads {
            thread.unread_count = self.storage.unread_count(&thread.thread_id, user_id)?;
        }
        threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(threads)
    }

    /// Messages of a thread, oldest first
    pub fn get_messages(&self, thread_id: &str) -> AppResult<Vec<ChatMessage>> {
        if self.storage.get_thread(thread_id)?.is_none() {
            return Err(AppError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(self.storage.get_messages(thread_id)?)
    }

    // ========== Status mirroring ==========

    /// Mirror the appointment's stored status onto its thread.
    ///
    /// Called for every appointment event; a no-op when the appointment never
    /// opened a thread. Returns the updated thread so the caller can push it.
    pub fn sync_thread_status(&self, appointment_id: &str) -> AppResult<Option<ChatThread>> {
        let Some(thread_id) = self.storage.thread_id_for_appointment(appointment_id)? else {
            return Ok(None);
        };
        let Some(snapshot) = self.appointments.storage().get_snapshot(appointment_id)? else {
            return Ok(None);
        };

        self.storage
            .set_thread_status(&thread_id, snapshot.status, snapshot.updated_at)?;
        let thread = self.storage.get_thread(&thread_id)?;
        if let Some(thread) = &thread {
            tracing::debug!(
                thread_id = %thread_id,
                status = %snapshot.status,
                "Thread status mirrored from appointment"
            );
            let _ = self.event_tx.send(ChatEvent::ThreadUpdated(thread.clone()));
        }
        Ok(thread)
    }
}

/// Reject sends once the appointment's effective status closes the thread
fn ensure_open(snapshot: &AppointmentSnapshot, now_millis: i64) -> AppResult<()> {
    match reducer::effective_status(snapshot, now_millis) {
        AppointmentStatus::Pending | AppointmentStatus::Approved => Ok(()),
        closed => Err(AppError::SendNotAllowed(format!(
            "appointment {} is {}",
            snapshot.appointment_id, closed
        ))),
    }
}

/// Build the thread for an appointment from its snapshot.
///
/// Store and provider display names are not on the snapshot; they start as
/// placeholders and clients refresh the participant directory out of band.
fn thread_from_snapshot(snapshot: &AppointmentSnapshot, now_millis: i64) -> ChatThread {
    let mut participants = vec![Participant {
        user_id: snapshot.customer_id.clone(),
        display_name: snapshot.customer_name.clone(),
        image_url: None,
        role: ParticipantRole::Customer,
        provider_kind: None,
    }];
    if let Some(store_id) = &snapshot.store_id {
        let mut store = Participant::placeholder(store_id);
        store.role = ParticipantRole::Store;
        participants.push(store);
    }
    if let Some(provider_id) = &snapshot.provider_id
        && participants.iter().all(|p| p.user_id != *provider_id)
    {
        let mut provider = Participant::placeholder(provider_id);
        provider.role = ParticipantRole::Provider;
        participants.push(provider);
    }

    let chair = snapshot
        .chair_name
        .clone()
        .unwrap_or_else(|| "Appointment".to_string());

    ChatThread {
        thread_id: uuid::Uuid::new_v4().to_string(),
        title: format!("{} · {} {}", chair, snapshot.date, snapshot.start_time),
        appointment_id: Some(snapshot.appointment_id.clone()),
        status: Some(snapshot.status),
        is_favorite_thread: false,
        participants,
        unread_count: 0,
        last_message_preview: None,
        last_message_at: None,
        created_at: now_millis,
        updated_at: now_millis,
    }
}
